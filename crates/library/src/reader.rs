use std::fs;
use std::io;
use std::path::Path;

use metadata::{MetadataError, TagInfo};

/// File content access used by a scan. Production reads the disk; tests
/// substitute an in-memory reader.
pub trait MediaReader {
    fn read_tags(&self, path: &Path) -> Result<TagInfo, MetadataError>;
    fn read_cover(&self, path: &Path) -> io::Result<Vec<u8>>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct LoftyReader;

impl MediaReader for LoftyReader {
    fn read_tags(&self, path: &Path) -> Result<TagInfo, MetadataError> {
        metadata::read_tags(path)
    }

    fn read_cover(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }
}
