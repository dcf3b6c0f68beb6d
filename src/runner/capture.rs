use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;

const READ_CHUNK_BYTES: usize = 8 * 1024;

/// Output kept from one stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Captured {
    pub bytes: Vec<u8>,
    /// Bytes beyond the limit were discarded, or the stream was abandoned
    /// while still open.
    pub truncated: bool,
}

/// Read `reader` to EOF, keeping at most `limit` bytes. The rest is drained so
/// the child never blocks on a full pipe.
///
/// Raising `stop` ends the read early (a detached grandchild can hold a pipe
/// open long after the child exits). What was read so far is returned,
/// flagged truncated.
pub async fn drain<R>(
    mut reader: R,
    limit: usize,
    stop: CancellationToken,
) -> std::io::Result<Captured>
where
    R: AsyncRead + Unpin,
{
    let mut captured = Captured::default();
    let mut chunk = vec![0u8; READ_CHUNK_BYTES];
    loop {
        let n = tokio::select! {
            biased;
            () = stop.cancelled() => {
                captured.truncated = true;
                break;
            }
            read = reader.read(&mut chunk) => read?,
        };
        if n == 0 {
            break;
        }
        let room = limit.saturating_sub(captured.bytes.len());
        if n > room {
            captured.truncated = true;
        }
        captured.bytes.extend_from_slice(&chunk[..n.min(room)]);
    }
    Ok(captured)
}
