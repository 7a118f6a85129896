// Transport: framed length-prefixed JSON RPC over TCP (spec section 5,
// "per-peer replication worker" and section 6 RPC shapes). Generalizes the
// teacher's `networking::transport::tcp` (`TcpTransport`/`TcpConnection`)
// from a raw byte-oriented pipe into a typed `RpcMessage` channel.

pub mod tcp;

pub use tcp::{TcpConfig, TcpTransport};

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::{RaftCacheError, Result};
use crate::rpc::RpcMessage;

/// Maximum single-frame size. An AppendEntries batch is bounded by
/// `max_entries_per_append` so this is generous headroom, not a tight fit;
/// exceeding it indicates a corrupt or hostile peer.
const MAX_FRAME_BYTES: u32 = 64 * 1024 * 1024;

/// Write one length-prefixed JSON frame: a 4-byte big-endian length followed
/// by the JSON payload.
pub async fn write_frame<W: tokio::io::AsyncWrite + Unpin>(writer: &mut W, message: &RpcMessage) -> Result<()> {
    let payload = serde_json::to_vec(message)?;
    let len = payload.len() as u32;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one length-prefixed JSON frame.
pub async fn read_frame<R: tokio::io::AsyncRead + Unpin>(reader: &mut R) -> Result<RpcMessage> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_BYTES {
        return Err(RaftCacheError::Network(format!("frame of {len} bytes exceeds max {MAX_FRAME_BYTES}")));
    }
    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await?;
    serde_json::from_slice(&payload).map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::RequestVoteRequest;

    #[tokio::test]
    async fn frame_roundtrips_through_an_in_memory_duplex() {
        let (mut client, mut server) = tokio::io::duplex(4096);
        let message = RpcMessage::RequestVote(RequestVoteRequest {
            term: 3,
            candidate_id: "n1".to_string(),
            last_log_index: 5,
            last_log_term: 2,
        });

        write_frame(&mut client, &message).await.unwrap();
        let received = read_frame(&mut server).await.unwrap();

        match received {
            RpcMessage::RequestVote(req) => assert_eq!(req.term, 3),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[tokio::test]
    async fn oversized_frame_is_rejected() {
        let (mut client, mut server) = tokio::io::duplex(16);
        client.write_all(&(MAX_FRAME_BYTES + 1).to_be_bytes()).await.unwrap();
        let result = read_frame(&mut server).await;
        assert!(result.is_err());
    }
}
