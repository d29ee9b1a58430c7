//! 스트림 헤더 전달
//!
//! 소스에 채널을 요청하고 헤더 `header_size` 바이트를 그대로 플레이어로 넘긴다

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::{Error, Result};

/// 헤더 복사 단위
const RELAY_CHUNK_SIZE: usize = 16 * 1024;

/// 정확히 `header_size` 바이트를 `source`에서 `player`로 복사
pub async fn relay_header<R, W>(source: &mut R, player: &mut W, header_size: usize) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; RELAY_CHUNK_SIZE.min(header_size.max(1))];
    let mut received = 0;

    while received < header_size {
        let want = (header_size - received).min(buf.len());
        let n = source.read(&mut buf[..want]).await?;
        if n == 0 {
            return Err(Error::HeaderTruncated {
                received,
                expected: header_size,
            });
        }
        player
            .write_all(&buf[..n])
            .await
            .map_err(|_| Error::PlayerDisconnected)?;
        received += n;
        debug!("header {}/{} bytes", received, header_size);
    }

    player.flush().await.map_err(|_| Error::PlayerDisconnected)?;
    Ok(())
}

/// 소스에서 헤더를 받아 플레이어로 전달
pub async fn communicate_header<W: AsyncWrite + Unpin>(
    source_addr: &str,
    channel: &str,
    player: &mut W,
    header_size: usize,
) -> Result<()> {
    let mut source = TcpStream::connect(source_addr).await?;
    let request = format!("GET /{} HTTP/1.1\r\n\r\n", channel);
    source.write_all(request.as_bytes()).await?;

    info!("{} retrieving the header ...", source.local_addr()?);
    relay_header(&mut source, player, header_size).await?;
    info!("header done ({} bytes)", header_size);
    Ok(())
}
