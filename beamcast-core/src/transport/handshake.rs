//! Wire handshake
//!
//! Three-phase binary handshake from the RTMP family. The local side sends
//! a fixed preamble (version byte plus a 1536-byte block of timestamp,
//! zeroes, and random bytes), reads the peer's preamble-plus-echo, and
//! confirms the round trip by echoing the peer's block back. The peer's
//! echo is validated byte-for-byte; the handshake never assumes success.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::{BufMut, BytesMut};
use rand::RngCore;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

use crate::error::{BeamcastError, Result};

/// Protocol version byte sent in phase 1
pub const HANDSHAKE_VERSION: u8 = 3;

/// Length of the timestamp + zeroes + random block
pub const HANDSHAKE_BLOCK_LEN: usize = 1536;

/// Random bytes in the handshake block
const RANDOM_LEN: usize = 1528;

/// Default bound on waiting for the peer's phase 2 response
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Build the local handshake block: 4-byte big-endian timestamp, 4 zero
/// bytes, 1528 pseudo-random bytes.
fn build_block() -> BytesMut {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u32)
        .unwrap_or(0);

    let mut block = BytesMut::with_capacity(HANDSHAKE_BLOCK_LEN);
    block.put_u32(timestamp);
    block.put_u32(0);
    let mut random = [0u8; RANDOM_LEN];
    rand::thread_rng().fill_bytes(&mut random);
    block.put_slice(&random);
    block
}

async fn read_exact_or_handshake_err<S>(stream: &mut S, buf: &mut [u8]) -> Result<()>
where
    S: AsyncRead + Unpin,
{
    stream.read_exact(buf).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            BeamcastError::handshake("Connection closed during handshake")
        } else {
            BeamcastError::handshake(format!("Handshake read failed: {}", e))
        }
    })?;
    Ok(())
}

/// Perform the client side of the three-phase handshake.
///
/// Fails with [`BeamcastError::Handshake`] if the connection closes before
/// a phase completes, if the peer's echo does not match the block we sent,
/// or if phase 2's response does not arrive within `timeout`.
pub async fn client_handshake<S>(stream: &mut S, timeout: Duration) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    // Phase 1: send our preamble
    let local_block = build_block();
    stream
        .write_all(&[HANDSHAKE_VERSION])
        .await
        .map_err(|e| BeamcastError::handshake(format!("Handshake write failed: {}", e)))?;
    stream
        .write_all(&local_block)
        .await
        .map_err(|e| BeamcastError::handshake(format!("Handshake write failed: {}", e)))?;
    stream
        .flush()
        .await
        .map_err(|e| BeamcastError::handshake(format!("Handshake flush failed: {}", e)))?;
    trace!("Handshake phase 1 sent ({} bytes)", 1 + HANDSHAKE_BLOCK_LEN);

    // Phase 2: read the peer's preamble and its echo of our block,
    // bounded by the protocol timeout
    let phase2 = async {
        let mut version = [0u8; 1];
        read_exact_or_handshake_err(stream, &mut version).await?;
        if version[0] != HANDSHAKE_VERSION {
            return Err(BeamcastError::handshake(format!(
                "Peer sent unsupported handshake version {}",
                version[0]
            )));
        }

        let mut peer_block = vec![0u8; HANDSHAKE_BLOCK_LEN];
        read_exact_or_handshake_err(stream, &mut peer_block).await?;

        let mut echo = vec![0u8; HANDSHAKE_BLOCK_LEN];
        read_exact_or_handshake_err(stream, &mut echo).await?;
        Ok((peer_block, echo))
    };

    let (peer_block, echo) = tokio::time::timeout(timeout, phase2)
        .await
        .map_err(|_| {
            BeamcastError::handshake(format!(
                "Peer did not complete handshake within {:?}",
                timeout
            ))
        })??;

    // The original protocol left this unverified; here a wrong echo is a
    // hard handshake failure.
    if echo[..] != local_block[..] {
        return Err(BeamcastError::handshake(
            "Peer echo does not match the block we sent",
        ));
    }

    // Phase 3: echo the peer's block back to confirm the round trip
    stream
        .write_all(&peer_block)
        .await
        .map_err(|e| BeamcastError::handshake(format!("Handshake write failed: {}", e)))?;
    stream
        .flush()
        .await
        .map_err(|e| BeamcastError::handshake(format!("Handshake flush failed: {}", e)))?;

    debug!("Handshake complete");
    Ok(())
}

/// Perform the peer (server) side of the handshake.
///
/// Used by tests and loopback peers: reads the client preamble, responds
/// with its own preamble plus the echo, and validates the client's
/// phase 3 echo.
pub async fn accept_handshake<S>(stream: &mut S, timeout: Duration) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let phases = async {
        let mut version = [0u8; 1];
        read_exact_or_handshake_err(stream, &mut version).await?;
        if version[0] != HANDSHAKE_VERSION {
            return Err(BeamcastError::handshake(format!(
                "Client sent unsupported handshake version {}",
                version[0]
            )));
        }

        let mut client_block = vec![0u8; HANDSHAKE_BLOCK_LEN];
        read_exact_or_handshake_err(stream, &mut client_block).await?;

        let local_block = build_block();
        stream
            .write_all(&[HANDSHAKE_VERSION])
            .await
            .map_err(|e| BeamcastError::handshake(format!("Handshake write failed: {}", e)))?;
        stream
            .write_all(&local_block)
            .await
            .map_err(|e| BeamcastError::handshake(format!("Handshake write failed: {}", e)))?;
        stream
            .write_all(&client_block)
            .await
            .map_err(|e| BeamcastError::handshake(format!("Handshake write failed: {}", e)))?;
        stream
            .flush()
            .await
            .map_err(|e| BeamcastError::handshake(format!("Handshake flush failed: {}", e)))?;

        let mut echo = vec![0u8; HANDSHAKE_BLOCK_LEN];
        read_exact_or_handshake_err(stream, &mut echo).await?;
        if echo[..] != local_block[..] {
            return Err(BeamcastError::handshake(
                "Client echo does not match the block we sent",
            ));
        }
        Ok(())
    };

    tokio::time::timeout(timeout, phases)
        .await
        .map_err(|_| {
            BeamcastError::handshake(format!(
                "Client did not complete handshake within {:?}",
                timeout
            ))
        })?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_handshake_over_duplex() {
        let (mut client, mut server) = tokio::io::duplex(8192);

        let server_task = tokio::spawn(async move {
            accept_handshake(&mut server, DEFAULT_HANDSHAKE_TIMEOUT).await
        });

        client_handshake(&mut client, DEFAULT_HANDSHAKE_TIMEOUT)
            .await
            .expect("client handshake should complete");
        server_task
            .await
            .unwrap()
            .expect("server handshake should complete");
    }

    #[tokio::test]
    async fn test_silent_peer_times_out() {
        let (mut client, _server) = tokio::io::duplex(8192);

        let start = std::time::Instant::now();
        let err = client_handshake(&mut client, Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, BeamcastError::Handshake(_)));
        assert!(start.elapsed() >= Duration::from_millis(200));
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_closed_peer_fails() {
        let (mut client, server) = tokio::io::duplex(8192);
        drop(server);

        let err = client_handshake(&mut client, DEFAULT_HANDSHAKE_TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, BeamcastError::Handshake(_)));
    }

    #[tokio::test]
    async fn test_bad_echo_rejected() {
        let (mut client, mut server) = tokio::io::duplex(8192);

        let server_task = tokio::spawn(async move {
            let mut version = [0u8; 1];
            server.read_exact(&mut version).await.unwrap();
            let mut client_block = vec![0u8; HANDSHAKE_BLOCK_LEN];
            server.read_exact(&mut client_block).await.unwrap();

            // Respond with a corrupted echo
            client_block[100] ^= 0xff;
            server.write_all(&[HANDSHAKE_VERSION]).await.unwrap();
            server.write_all(&vec![0u8; HANDSHAKE_BLOCK_LEN]).await.unwrap();
            server.write_all(&client_block).await.unwrap();
            server.flush().await.unwrap();
        });

        let err = client_handshake(&mut client, DEFAULT_HANDSHAKE_TIMEOUT)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("echo"));
        server_task.await.unwrap();
    }
}
