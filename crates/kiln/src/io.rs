//! # File Loading
//!
//! Reads whole files straight into the per-frame arena, so loading a
//! shader or a level chunk never touches the heap.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use kiln_core::{Arena, BufferView, LinearAllocator, MemoryResult};

use crate::error::{EngineError, EngineResult};

/// A file's bytes, living in the linear arena until its next reset.
#[derive(Clone, Copy, Debug)]
pub struct FileContents {
    view: BufferView<u8>,
}

impl FileContents {
    /// View of the bytes.
    #[inline]
    #[must_use]
    pub const fn view(&self) -> BufferView<u8> {
        self.view
    }

    /// File size in bytes.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.view.len()
    }

    /// Checks if the file was empty.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.view.is_empty()
    }

    /// Resolves the bytes.
    ///
    /// # Errors
    ///
    /// `StaleView` if the arena was reset since the file was read.
    pub fn bytes<'a>(&self, linear: &'a LinearAllocator) -> MemoryResult<&'a [u8]> {
        linear.get(self.view)
    }
}

/// Reads the whole file at `path` into `linear`.
///
/// # Errors
///
/// `Io` if the file cannot be opened or read, `Memory` if it does not fit
/// in the arena.
#[track_caller]
pub fn read_file(path: impl AsRef<Path>, linear: &mut LinearAllocator) -> EngineResult<FileContents> {
    let path = path.as_ref();
    let io_error = |source| EngineError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut file = File::open(path).map_err(io_error)?;
    let size = file.metadata().map_err(io_error)?.len();
    let view = linear.allocate(usize::try_from(size).unwrap_or(usize::MAX))?;
    file.read_exact(linear.get_mut(view)?).map_err(io_error)?;

    tracing::debug!(path = %path.display(), size, offset = view.offset(), "file read into linear arena");
    Ok(FileContents { view })
}
