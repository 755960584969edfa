use std::collections::HashMap;

/// Represents size limits of the incoming body to keep memory and disk use
/// bounded.
///
/// Every limit is unset by default. Please refer [`Config`](crate::Config)
/// for how the limits are applied.
#[derive(Debug, Clone, Default)]
pub struct SizeLimit {
    pub(crate) whole_stream: Option<u64>,
    pub(crate) per_field: Option<u64>,
    pub(crate) per_file: Option<u64>,
    pub(crate) field_map: HashMap<String, u64>,
}

impl SizeLimit {
    /// Creates a size limit with nothing limited.
    pub fn new() -> SizeLimit {
        SizeLimit::default()
    }

    /// Sets size limit for the whole body.
    pub fn whole_stream(mut self, limit: u64) -> SizeLimit {
        self.whole_stream = Some(limit);
        self
    }

    /// Sets size limit for each text field. URL-encoded bodies apply it to
    /// every raw `key=value` pair.
    pub fn per_field(mut self, limit: u64) -> SizeLimit {
        self.per_field = Some(limit);
        self
    }

    /// Sets size limit for each uploaded file.
    pub fn per_file(mut self, limit: u64) -> SizeLimit {
        self.per_file = Some(limit);
        self
    }

    /// Sets size limit for a specific field name, it overrides the
    /// `per_field` or `per_file` value for parts with this name.
    pub fn for_field<N: Into<String>>(mut self, field_name: N, limit: u64) -> SizeLimit {
        self.field_map.insert(field_name.into(), limit);
        self
    }

    pub(crate) fn field_limit_for(&self, field_name: &str) -> Option<u64> {
        self.field_map.get(field_name).copied().or(self.per_field)
    }

    pub(crate) fn file_limit_for(&self, field_name: &str) -> Option<u64> {
        self.field_map.get(field_name).copied().or(self.per_file)
    }
}
