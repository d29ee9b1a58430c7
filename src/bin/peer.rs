//! P2PSP 피어 - 클러스터 블록 릴레이 노드
//!
//! 플레이어 접속을 기다린 뒤 소스에서 스트림 헤더를 받아 넘기고,
//! 스플리터에 합류해 블록을 중계하면서 플레이어로 재생 스트림을 보낸다
//!
//! 사용법:
//!   cargo run --release --bin p2psp-peer -- [OPTIONS]
//!
//! 예시:
//!   # 기본 (플레이어는 localhost:9998 에 접속)
//!   cargo run --release --bin p2psp-peer -- --splitter 10.0.0.1:4552 --source 10.0.0.1:4551
//!
//!   # 릴레이 전용, 평균 60초 뒤 이탈
//!   cargo run --release --bin p2psp-peer -- --no-player --churn-scale 60

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use p2psp::{Config, PeerNode};

/// 진행 상황 로그 주기
const PROGRESS_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// 링 버퍼 크기 (블록 수, 65536의 약수)
    #[arg(long, env = "P2PSP_BUFFER_SIZE", default_value_t = p2psp::DEFAULT_BUFFER_SIZE)]
    buffer_size: usize,

    /// 블록 페이로드 크기 (바이트)
    #[arg(long, env = "P2PSP_BLOCK_SIZE", default_value_t = p2psp::DEFAULT_BLOCK_SIZE)]
    block_size: usize,

    /// 스트림 헤더 크기 (바이트)
    #[arg(long, env = "P2PSP_HEADER_SIZE", default_value_t = p2psp::DEFAULT_HEADER_SIZE)]
    header_size: usize,

    /// 플레이어 대기 포트
    #[arg(short = 'p', long, env = "P2PSP_LISTENING_PORT", default_value_t = 9998)]
    listening_port: u16,

    #[arg(short, long, env = "P2PSP_SPLITTER", default_value = "localhost:4552")]
    splitter: String,

    #[arg(long, env = "P2PSP_SOURCE", default_value = "localhost:4551")]
    source: String,

    #[arg(short, long, env = "P2PSP_CHANNEL", default_value = "134.ogg")]
    channel: String,

    /// 플레이어 없이 릴레이만 수행
    #[arg(long, env = "P2PSP_NO_PLAYER")]
    no_player: bool,

    /// 처리할 최대 블록 수
    #[arg(long, env = "P2PSP_MAX_BLOCKS")]
    max_blocks: Option<u64>,

    /// 클러스터 수신 타임아웃 (밀리초)
    #[arg(long, env = "P2PSP_RECV_TIMEOUT_MS", default_value_t = 1000)]
    recv_timeout_ms: u64,

    /// 이탈 Weibull 스케일 (초, 0이면 이탈 없음)
    #[arg(long, env = "P2PSP_CHURN_SCALE", default_value_t = 0.0)]
    churn_scale: f64,

    #[arg(long, env = "P2PSP_CHURN_SHAPE", default_value_t = 1.0)]
    churn_shape: f64,

    /// RUST_LOG 가 없을 때 쓰는 로그 레벨
    #[arg(long, env = "P2PSP_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// 로그를 추가로 기록할 파일
    #[arg(long, env = "P2PSP_LOG_FILE")]
    log_file: Option<PathBuf>,
}

impl Args {
    fn to_config(&self) -> Config {
        Config {
            buffer_size: self.buffer_size,
            block_size: self.block_size,
            header_size: self.header_size,
            listening_port: self.listening_port,
            splitter_addr: self.splitter.clone(),
            source_addr: self.source.clone(),
            channel: self.channel.clone(),
            player_enabled: !self.no_player,
            max_blocks: self.max_blocks,
            recv_timeout_ms: self.recv_timeout_ms,
            churn_scale: self.churn_scale,
            churn_shape: self.churn_shape,
            ..Config::default()
        }
    }
}

fn init_logging(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    let file_layer = match &args.log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .try_init()?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_logging(&args)?;

    let config = args.to_config();
    config.validate()?;

    info!("P2PSP peer starting...");
    info!("Splitter: {} | Source: {}/{}", config.splitter_addr, config.source_addr, config.channel);
    if config.player_enabled {
        info!("Waiting for the player at port {}", config.listening_port);
    } else {
        info!("Relay-only mode (no player)");
    }

    // 플레이어 대기 중에도 Ctrl-C 로 빠져나올 수 있어야 함
    let node = tokio::select! {
        node = PeerNode::start(config) => node?,
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted before joining the cluster");
            return Ok(());
        }
    };

    let handle = node.handle();

    let signal_handle = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C, leaving the cluster...");
            signal_handle.stop();
        }
    });

    let progress_handle = handle.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PROGRESS_INTERVAL);
        interval.tick().await;
        while progress_handle.is_running() {
            interval.tick().await;
            info!("{}", progress_handle.stats().summary());
        }
    });

    match node.serve().await {
        Ok((reason, stats)) => {
            info!("exit: {:?}", reason);
            info!("{}", stats.summary());
            if let Some(report) = &stats.buffering {
                info!(
                    "buffering took {:.2}s, lost {:.2}%",
                    report.elapsed.as_secs_f64(),
                    report.loss_percentage()
                );
            }
            Ok(())
        }
        Err(e) => {
            error!("peer failed: {}", e);
            Err(e.into())
        }
    }
}
