use anyhow::{Context, Result};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

/// A seekable byte stream a parsing strategy reads from. Only the chunk
/// generator touches the media, so positioned reads take `&mut self`.
pub trait LogMedia: Send {
    /// Size in bytes of the currently available data.
    fn size(&mut self) -> Result<u64>;

    /// Read bytes at `position`, filling as much of `buf` as the media can.
    /// Returns the number of bytes read; 0 means end of stream.
    fn read_at(&mut self, position: u64, buf: &mut [u8]) -> Result<usize>;
}

/// Log media backed by a file on disk.
pub struct FileMedia {
    file: File,
}

impl FileMedia {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())
            .with_context(|| format!("failed to open log file '{}'", path.as_ref().display()))?;
        Ok(Self { file })
    }
}

impl LogMedia for FileMedia {
    fn size(&mut self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    fn read_at(&mut self, position: u64, buf: &mut [u8]) -> Result<usize> {
        self.file.seek(SeekFrom::Start(position))?;
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.file.read(&mut buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(filled)
    }
}

/// In-memory log media, used by tests and short-lived sessions.
pub struct MemoryMedia {
    data: Vec<u8>,
}

impl MemoryMedia {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }
}

impl LogMedia for MemoryMedia {
    fn size(&mut self) -> Result<u64> {
        Ok(self.data.len() as u64)
    }

    fn read_at(&mut self, position: u64, buf: &mut [u8]) -> Result<usize> {
        let start = (position as usize).min(self.data.len());
        let end = (start + buf.len()).min(self.data.len());
        let n = end - start;
        buf[..n].copy_from_slice(&self.data[start..end]);
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_memory_media_reads() -> Result<()> {
        let mut media = MemoryMedia::new(b"hello".to_vec());
        assert_eq!(media.size()?, 5);

        let mut buf = [0u8; 3];
        assert_eq!(media.read_at(1, &mut buf)?, 3);
        assert_eq!(&buf, b"ell");

        // Partial read at the tail, zero read past it
        assert_eq!(media.read_at(4, &mut buf)?, 1);
        assert_eq!(media.read_at(5, &mut buf)?, 0);
        assert_eq!(media.read_at(100, &mut buf)?, 0);
        Ok(())
    }

    #[test]
    fn test_file_media_positioned_reads() -> Result<()> {
        let mut temp = NamedTempFile::new()?;
        temp.write_all(b"line1\nline2\n")?;
        temp.flush()?;

        let mut media = FileMedia::open(temp.path())?;
        assert_eq!(media.size()?, 12);

        let mut buf = [0u8; 6];
        assert_eq!(media.read_at(6, &mut buf)?, 6);
        assert_eq!(&buf, b"line2\n");

        assert_eq!(media.read_at(12, &mut buf)?, 0);
        Ok(())
    }
}
