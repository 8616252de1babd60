mod image_text_match;

pub use image_text_match::*;

pub trait Model {
    type Item;
    type Output;

    fn process(
        &mut self,
        items: Vec<Self::Item>,
    ) -> impl std::future::Future<Output = anyhow::Result<Vec<anyhow::Result<Self::Output>>>> + Send;

    fn batch_size_limit(&self) -> usize;
}
