mod download;
pub use download::*;

#[cfg(test)]
mod test {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_download_url() {
        let download = FileDownload::new("resources", Some("https://example.com/models/"));

        assert_eq!(
            download
                .download_url(Path::new("blip-itm-base-coco").join("model.onnx"))
                .unwrap(),
            "https://example.com/models/blip-itm-base-coco/model.onnx"
        );
        assert!(download.can_provide("never/fetched.onnx"));
    }

    #[tokio::test]
    async fn test_missing_file_without_url_is_an_error() {
        let resources_dir = std::env::temp_dir().join("file-downloader-offline-test");
        let download = FileDownload::new(&resources_dir, None);

        assert!(download.download_url("blip/model.onnx").is_err());
        assert!(!download.can_provide("blip/model.onnx"));

        let err = download.ensure("blip/model.onnx").await.unwrap_err();
        assert!(err.to_string().contains("no download url is configured"));
    }

    #[tokio::test]
    async fn test_existing_files_are_not_downloaded() {
        let resources_dir = std::env::temp_dir().join("file-downloader-test");
        tokio::fs::create_dir_all(resources_dir.join("blip"))
            .await
            .unwrap();
        tokio::fs::write(resources_dir.join("blip/tokenizer.json"), "{}")
            .await
            .unwrap();
        tokio::fs::write(resources_dir.join("blip/model.onnx"), "")
            .await
            .unwrap();

        let download = FileDownload::new(&resources_dir, None);
        assert!(download.can_provide("blip/tokenizer.json"));

        let paths = download
            .ensure_all(&["blip/model.onnx", "blip/tokenizer.json"])
            .await
            .unwrap();
        assert_eq!(
            paths,
            vec![
                resources_dir.join("blip/model.onnx"),
                resources_dir.join("blip/tokenizer.json")
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_download_leaves_nothing_behind() {
        let resources_dir = std::env::temp_dir().join("file-downloader-failure-test");
        let download = FileDownload::new(&resources_dir, Some("http://127.0.0.1:9"));

        assert!(download.ensure("missing/model.onnx").await.is_err());
        assert!(!resources_dir.join("missing/model.onnx").exists());
        assert!(!resources_dir.join("missing/model.part").exists());
    }
}
