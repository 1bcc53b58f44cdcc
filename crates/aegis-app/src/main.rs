//! # aegis-app
//!
//! AEGIS 클라이언트 바이너리 진입점.
//! DI 컨테이너 역할: 어댑터들을 조립하고 슈퍼바이저/브리지 루프를
//! 기동한 뒤 ctrl-c까지 대기한다.

mod sos;
mod supervisor;

use aegis_core::config_manager::ConfigManager;
use aegis_core::models::customer::Credentials;
use aegis_core::ports::api_client::UserApi;
use aegis_core::ports::credential_store::CredentialStore;
use aegis_core::ports::reporting::SosReporting;
use aegis_location::provider::FixedLocationProvider;
use aegis_location::reporter::{LocationReporter, ReporterConfig};
use aegis_network::auth::TokenGatekeeper;
use aegis_network::connectivity::ConnectivityMonitor;
use aegis_network::http_client::HttpApiClient;
use aegis_network::session::SocketSession;
use aegis_network::ws::WsConnector;
use aegis_storage::{KeyringSecretStore, MemoryCredentialStore, PersistentCredentialStore};
use aegis_wear::bridge::WearBridge;
use aegis_wear::transport::InProcessCompanionTransport;
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::sos::SosController;
use crate::supervisor::Supervisor;

/// AEGIS 개인 안전 클라이언트
///
/// SOS 알람을 트리거하면 디스패치 백엔드로 실시간 위치를 스트리밍한다.
#[derive(Parser, Debug)]
#[command(name = "aegis")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// 서버 URL 지정 (기본: 설정 파일 값)
    #[arg(long, short = 's')]
    server: Option<String>,

    /// 로그 레벨 (trace, debug, info, warn, error)
    #[arg(long, short = 'l', default_value = "info")]
    log_level: String,

    /// 자격증명 저장 경로 (기본: 인메모리)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// 로그인 아이디 (비밀번호와 함께 지정 시 기동 시 로그인)
    #[arg(long)]
    login: Option<String>,

    /// 로그인 비밀번호
    #[arg(long)]
    password: Option<String>,

    /// 고정 위치 제공자의 위도
    #[arg(long, default_value_t = 52.2297)]
    latitude: f64,

    /// 고정 위치 제공자의 경도
    #[arg(long, default_value_t = 21.0122)]
    longitude: f64,

    /// 기동 직후 SOS 보고 시작
    #[arg(long)]
    sos: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(args.log_level.clone())),
        )
        .init();

    // ============================================================
    // 설정 로드
    // ============================================================
    let config_manager = ConfigManager::new().context("설정 로드 실패")?;
    if let Some(server) = &args.server {
        config_manager
            .update_with(|c| c.server.base_url = server.clone())
            .context("서버 URL 반영 실패")?;
    }
    let config = config_manager.get();
    info!("서버: {}", config.server.base_url);

    // ============================================================
    // 어댑터 조립
    // ============================================================
    let store: Arc<dyn CredentialStore> = match &args.data_dir {
        Some(dir) => Arc::new(
            PersistentCredentialStore::with_secret_store(
                dir,
                Box::new(KeyringSecretStore::new().context("키링 초기화 실패")?),
            )
            .context("자격증명 저장소 초기화 실패")?,
        ),
        None => {
            debug!("데이터 디렉토리 미지정 — 인메모리 자격증명 저장소 사용");
            Arc::new(MemoryCredentialStore::new())
        }
    };

    let gatekeeper = Arc::new(TokenGatekeeper::new(
        &config.server.base_url,
        store.clone(),
        config.auth.expiration_threshold(),
    ));

    let api: Arc<dyn UserApi> = Arc::new(
        HttpApiClient::new(
            &config.server.base_url,
            store.clone(),
            gatekeeper.clone(),
            Duration::from_secs(config.server.request_timeout_secs),
        )
        .context("HTTP 클라이언트 초기화 실패")?,
    );

    let session = SocketSession::new(
        Arc::new(WsConnector::new()),
        store.clone(),
        &config.server.socket_url(),
        config.session.reconnect_delay(),
        config.session.send_queue_limit,
    );

    let provider = Arc::new(FixedLocationProvider::new(args.latitude, args.longitude));
    let reporter = Arc::new(LocationReporter::new(
        session.clone(),
        gatekeeper.clone(),
        provider,
        store.clone(),
        ReporterConfig {
            update_interval: config.location.update_interval(),
            check_interval_count: config.auth.check_interval_count(&config.location),
        },
    ));
    let controller = SosController::new(reporter);

    let (companion_transport, mut watch_rx, _watch_tx) = InProcessCompanionTransport::new();
    // 워치행 메시지를 로그로 비추는 데모 싱크
    tokio::spawn(async move {
        while let Some(message) = watch_rx.recv().await {
            debug!("워치행 메시지: {} {}", message.path, message.payload_text());
        }
    });

    let bridge = WearBridge::new(
        companion_transport.clone(),
        session.clone(),
        gatekeeper.clone(),
        store.clone(),
        controller.clone(),
    );

    let connectivity = Arc::new(ConnectivityMonitor::new(
        config.connectivity.offline_threshold,
    ));
    let supervisor = Supervisor::new(
        config.clone(),
        gatekeeper.clone(),
        api.clone(),
        session.clone(),
        companion_transport.clone(),
        connectivity.clone(),
    );

    // ============================================================
    // 인증
    // ============================================================
    match (&args.login, &args.password) {
        (Some(login), Some(password)) => {
            let customer = api
                .login(&Credentials {
                    login: login.clone(),
                    password: password.clone(),
                })
                .await
                .context("로그인 실패")?;
            info!("로그인 완료: {} {}", customer.name, customer.surname);
        }
        _ => {
            if let Some(token) = store.access_token() {
                match api.check_token(&token).await {
                    Ok(customer) => info!("세션 복원: {} {}", customer.name, customer.surname),
                    Err(e) => warn!("저장된 토큰 검증 실패: {e}"),
                }
            } else {
                warn!("자격증명 없음 — --login/--password로 로그인 필요");
            }
        }
    }

    // ============================================================
    // 루프 기동
    // ============================================================
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // 컴패니언 연결 상태 변화를 로그로 반영
    let mut companion_rx = supervisor.subscribe_companion();
    tokio::spawn(async move {
        while companion_rx.changed().await.is_ok() {
            let connected = *companion_rx.borrow_and_update();
            info!("워치 연결 상태: {}", if connected { "연결됨" } else { "끊김" });
        }
    });

    let bridge_task = tokio::spawn(bridge.clone().run(shutdown_rx.clone()));
    let supervisor_rx = shutdown_rx.clone();
    let supervisor_task = tokio::spawn(async move { supervisor.run(supervisor_rx).await });

    if args.sos {
        info!("SOS 보고 시작 (--sos)");
        if let Err(e) = controller.start_reporting().await {
            warn!("SOS 시작 실패: {e}");
        }
    }

    tokio::signal::ctrl_c().await.context("시그널 대기 실패")?;
    info!("종료 신호 수신 — 정리 중");

    // 보고 루프가 취소 통지/종료 코드로 세션을 정리한다
    if let Err(e) = controller.stop_reporting().await {
        warn!("보고 루프 정지 실패: {e}");
    }
    session.disconnect().await;

    let _ = shutdown_tx.send(true);
    let _ = supervisor_task.await;
    bridge_task.abort();

    info!("종료 완료");
    Ok(())
}
