//! Positioning the file cursor at the beginning of a line.

use std::io::{self, SeekFrom};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};

/// Bytes examined per backward read while looking for a newline.
const SCAN_BLOCK_SIZE: u64 = 256;

/// Seeks to `pos`, then moves the cursor back to the start of the line that
/// contains it. Returns the final cursor offset.
///
/// The byte at the target offset itself is not examined: if the byte right
/// before it is `\n`, the target already starts a line and the cursor stays.
/// Without any earlier newline the cursor lands at offset 0.
pub(crate) async fn seek_to_line_start<R>(file: &mut R, pos: SeekFrom) -> io::Result<u64>
where
    R: AsyncRead + AsyncSeek + Unpin,
{
    let target = file.seek(pos).await?;
    if target == 0 {
        return Ok(0);
    }

    let line_start = find_line_start(file, target).await?;
    file.seek(SeekFrom::Start(line_start)).await
}

/// Scans backward from `target` in fixed-size blocks, nearest bytes first.
async fn find_line_start<R>(file: &mut R, target: u64) -> io::Result<u64>
where
    R: AsyncRead + AsyncSeek + Unpin,
{
    let mut buf = vec![0u8; SCAN_BLOCK_SIZE as usize];
    let mut block_end = target;

    while block_end > 0 {
        let block_start = block_end.saturating_sub(SCAN_BLOCK_SIZE);
        let len = (block_end - block_start) as usize;

        file.seek(SeekFrom::Start(block_start)).await?;
        let n = read_block(file, &mut buf[..len]).await?;

        // A short read means the file ends before block_end
        if let Some(i) = buf[..n].iter().rposition(|&b| b == b'\n') {
            return Ok(block_start + i as u64 + 1);
        }

        block_end = block_start;
    }

    Ok(0)
}

/// Fills `buf` unless EOF comes first. Returns the number of bytes read.
async fn read_block<R>(file: &mut R, buf: &mut [u8]) -> io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]).await? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}
