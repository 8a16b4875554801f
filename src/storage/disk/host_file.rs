use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::Arc;

use parking_lot::Mutex;

/// A random-access byte store the page manager can live on.
///
/// Implemented for plain files; embedding applications can supply their own
/// (an encrypted virtual file, for instance).
pub trait HostFile: Read + Write + Seek + Send {
    /// Current length in bytes.
    fn size(&self) -> io::Result<u64>;

    /// Truncates or extends the store to `len` bytes.
    fn set_len(&mut self, len: u64) -> io::Result<()>;

    /// Makes every completed write durable.
    fn sync_all(&mut self) -> io::Result<()>;

    /// Whether the store behaves like a regular file.
    fn is_regular_file(&self) -> io::Result<bool> {
        Ok(true)
    }
}

impl HostFile for File {
    fn size(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn set_len(&mut self, len: u64) -> io::Result<()> {
        File::set_len(self, len)
    }

    fn sync_all(&mut self) -> io::Result<()> {
        File::sync_all(self)
    }

    fn is_regular_file(&self) -> io::Result<bool> {
        Ok(self.metadata()?.is_file())
    }
}

/// An in-memory [`HostFile`].
///
/// Clones share the same bytes but keep their own cursor, so a clone handed
/// to a database file can be reopened later through another clone.
#[derive(Debug, Clone, Default)]
pub struct MemoryFile {
    data: Arc<Mutex<Vec<u8>>>,
    position: u64,
}

impl MemoryFile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            data: Arc::new(Mutex::new(bytes)),
            position: 0,
        }
    }

    /// Copy of the current contents.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.data.lock().clone()
    }
}

impl Read for MemoryFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let data = self.data.lock();
        let start = (self.position as usize).min(data.len());
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        self.position += n as u64;
        Ok(n)
    }
}

impl Write for MemoryFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut data = self.data.lock();
        let start = self.position as usize;
        let end = start + buf.len();
        if data.len() < end {
            data.resize(end, 0);
        }
        data[start..end].copy_from_slice(buf);
        self.position = end as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for MemoryFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let len = self.data.lock().len() as i64;
        let next = match pos {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::End(delta) => len + delta,
            SeekFrom::Current(delta) => self.position as i64 + delta,
        };
        if next < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of memory file",
            ));
        }
        self.position = next as u64;
        Ok(self.position)
    }
}

impl HostFile for MemoryFile {
    fn size(&self) -> io::Result<u64> {
        Ok(self.data.lock().len() as u64)
    }

    fn set_len(&mut self, len: u64) -> io::Result<()> {
        self.data.lock().resize(len as usize, 0);
        Ok(())
    }

    fn sync_all(&mut self) -> io::Result<()> {
        Ok(())
    }
}
