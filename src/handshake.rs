//! 스플리터 핸드쉐이크
//!
//! TCP로 스플리터에 접속해 게더러와 클러스터 피어 목록을 받는다.
//! 와이어 포맷 (모두 네트워크 바이트 순서):
//!
//! ```text
//! [count: u16] [gatherer: IPv4 4 bytes + port u16] ([IPv4][port: u16]) * count
//! ```
//!
//! count는 게더러를 뺀 초기 피어 수. 0이면 클러스터에 게더러만 있음

use std::net::{Ipv4Addr, SocketAddr};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::{lookup_host, TcpSocket, TcpStream};
use tracing::{debug, info};

use crate::{Error, Result};

/// 엔드포인트 레코드 크기 (IPv4 4바이트 + 포트 2바이트)
pub const ENDPOINT_RECORD_SIZE: usize = 6;

/// 스플리터가 알려준 클러스터 구성
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterList {
    pub gatherer: SocketAddr,
    pub peers: Vec<SocketAddr>,
}

/// 스트림에서 클러스터 목록 읽기
pub async fn read_cluster_list<R: AsyncRead + Unpin>(reader: &mut R) -> Result<ClusterList> {
    let count = reader
        .read_u16()
        .await
        .map_err(|e| Error::Handshake(format!("피어 수 수신 실패: {}", e)))?;
    debug!("Cluster size = {} peers + gatherer", count);

    let gatherer = read_endpoint(reader)
        .await
        .map_err(|e| Error::Handshake(format!("게더러 레코드 수신 실패: {}", e)))?;

    let mut peers = Vec::with_capacity(count as usize);
    for index in 0..count {
        let peer = read_endpoint(reader).await.map_err(|e| {
            Error::Handshake(format!("피어 레코드 {}/{} 수신 실패: {}", index + 1, count, e))
        })?;
        peers.push(peer);
    }

    Ok(ClusterList { gatherer, peers })
}

async fn read_endpoint<R: AsyncRead + Unpin>(reader: &mut R) -> std::io::Result<SocketAddr> {
    let mut record = [0u8; ENDPOINT_RECORD_SIZE];
    reader.read_exact(&mut record).await?;
    Ok(parse_endpoint(&record))
}

fn parse_endpoint(record: &[u8; ENDPOINT_RECORD_SIZE]) -> SocketAddr {
    let ip = Ipv4Addr::new(record[0], record[1], record[2], record[3]);
    let port = u16::from_be_bytes([record[4], record[5]]);
    SocketAddr::from((ip, port))
}

/// 스플리터 TCP 연결
///
/// 로컬 포트는 클러스터 UDP 소켓에서 그대로 재사용됨
pub struct SplitterConnection {
    stream: TcpStream,
    splitter: SocketAddr,
    local_addr: SocketAddr,
}

impl SplitterConnection {
    /// 스플리터에 접속 (IPv4 주소만 사용)
    pub async fn connect(splitter_addr: &str) -> Result<Self> {
        let target = lookup_host(splitter_addr)
            .await
            .map_err(|e| Error::Handshake(format!("{} 주소 해석 실패: {}", splitter_addr, e)))?
            .find(SocketAddr::is_ipv4)
            .ok_or_else(|| Error::Handshake(format!("{}: IPv4 주소 없음", splitter_addr)))?;

        let socket = TcpSocket::new_v4()?;
        socket.set_reuseaddr(true)?;
        let stream = socket
            .connect(target)
            .await
            .map_err(|e| Error::Handshake(format!("{} 접속 실패: {}", target, e)))?;

        // "localhost" 같은 이름 대신 실제 주소를 손실 신고 대상으로 사용
        let splitter = stream.peer_addr()?;
        let local_addr = stream.local_addr()?;
        info!("{} connected to the splitter {}", local_addr, splitter);

        Ok(Self {
            stream,
            splitter,
            local_addr,
        })
    }

    pub fn splitter(&self) -> SocketAddr {
        self.splitter
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// 클러스터 목록 수신 후 연결 종료
    pub async fn read_cluster_list(mut self) -> Result<ClusterList> {
        let list = read_cluster_list(&mut self.stream).await?;
        info!(
            "gatherer {}, {} peers from the splitter",
            list.gatherer,
            list.peers.len()
        );
        Ok(list)
    }
}
