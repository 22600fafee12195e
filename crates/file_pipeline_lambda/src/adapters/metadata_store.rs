use file_pipeline_core::contract::{FileMetadataRecord, RecordPage};

pub trait MetadataStore {
    fn put_record(&self, record: &FileMetadataRecord) -> Result<(), String>;

    fn get_record(&self, file_id: &str) -> Result<Option<FileMetadataRecord>, String>;

    /// Returns up to `limit` records starting after `cursor` (a `file_id`).
    fn list_records(&self, limit: usize, cursor: Option<&str>) -> Result<RecordPage, String>;
}
