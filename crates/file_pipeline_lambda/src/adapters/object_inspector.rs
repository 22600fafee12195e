use file_pipeline_core::contract::ObjectDetails;

pub trait ObjectInspector {
    /// `Ok(None)` when the object no longer exists.
    fn inspect(&self, bucket: &str, key: &str) -> Result<Option<ObjectDetails>, String>;
}
