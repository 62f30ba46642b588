use std::io;
use std::path::Path;

use tokio::fs::File;
use tokio_util::io::ReaderStream;

/// Opens `path` as a chunk stream for [`crate::drive_upload`].
///
/// Each read asks for at most `chunk_size` bytes; the stream may still
/// yield shorter chunks. Returns the stream and the file length.
pub async fn file_source(path: &Path, chunk_size: usize) -> io::Result<(ReaderStream<File>, u64)> {
    let file = File::open(path).await?;
    let size = file.metadata().await?.len();
    let chunk_size = if chunk_size == 0 {
        crate::DEFAULT_CHUNK_SIZE as usize
    } else {
        chunk_size
    };
    Ok((ReaderStream::with_capacity(file, chunk_size), size))
}
