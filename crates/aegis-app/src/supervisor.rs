//! 2-루프 슈퍼바이저.
//!
//! 토큰 갱신(임계값 × 500ms)과 도달 가능성 폴링(온라인 15초/오프라인
//! 5초 적응형) 오케스트레이션. 세션이 의도적으로 닫혀 있는 동안에만
//! REST 핑으로 연결 상태를 추적해 stale "connected" 표시를 막는다.
//! 컴패니언 노드 존재 여부도 같은 주기로 발행한다.

use aegis_core::config::AppConfig;
use aegis_core::ports::api_client::UserApi;
use aegis_core::ports::companion::CompanionTransport;
use aegis_network::auth::TokenGatekeeper;
use aegis_network::connectivity::ConnectivityMonitor;
use aegis_network::session::SocketSession;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// 백그라운드 루프 슈퍼바이저
pub struct Supervisor {
    config: AppConfig,
    gatekeeper: Arc<TokenGatekeeper>,
    api: Arc<dyn UserApi>,
    session: Arc<SocketSession>,
    companion: Arc<dyn CompanionTransport>,
    connectivity: Arc<ConnectivityMonitor>,
    /// 컴패니언(워치) 연결 여부 발행
    companion_tx: watch::Sender<bool>,
}

impl Supervisor {
    /// 새 슈퍼바이저 생성
    pub fn new(
        config: AppConfig,
        gatekeeper: Arc<TokenGatekeeper>,
        api: Arc<dyn UserApi>,
        session: Arc<SocketSession>,
        companion: Arc<dyn CompanionTransport>,
        connectivity: Arc<ConnectivityMonitor>,
    ) -> Self {
        let (companion_tx, _) = watch::channel(false);
        Self {
            config,
            gatekeeper,
            api,
            session,
            companion,
            connectivity,
            companion_tx,
        }
    }

    /// 컴패니언 연결 상태 구독
    pub fn subscribe_companion(&self) -> watch::Receiver<bool> {
        self.companion_tx.subscribe()
    }

    /// 모든 루프 시작 (셧다운 신호까지 블로킹)
    pub async fn run(&self, mut shutdown_rx: watch::Receiver<bool>) {
        let refresh_interval = self.config.auth.refresh_check_interval();
        info!(
            "슈퍼바이저 시작: 토큰 갱신={}ms, 폴링 온라인={}s/오프라인={}s",
            refresh_interval.as_millis(),
            self.config.connectivity.poll_online_secs,
            self.config.connectivity.poll_offline_secs,
        );

        // ============================================================
        // 1. 토큰 갱신 루프 (임계값 × 500ms)
        // ============================================================
        let gatekeeper = self.gatekeeper.clone();
        let mut shutdown1 = shutdown_rx.clone();

        let refresh_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(refresh_interval);
            interval.tick().await; // 즉시 완료되는 첫 틱 소비

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if gatekeeper.refresh_if_needed().await.is_none() {
                            warn!("백그라운드 토큰 갱신 실패");
                        }
                    }
                    _ = shutdown1.changed() => {
                        info!("토큰 갱신 루프 종료");
                        break;
                    }
                }
            }
        });

        // ============================================================
        // 2. 도달 가능성 폴링 루프 (적응형 주기)
        // ============================================================
        let api = self.api.clone();
        let session = self.session.clone();
        let companion = self.companion.clone();
        let connectivity = self.connectivity.clone();
        let companion_tx = self.companion_tx.clone();
        let poll_online = Duration::from_secs(self.config.connectivity.poll_online_secs);
        let poll_offline = Duration::from_secs(self.config.connectivity.poll_offline_secs);
        let mut shutdown2 = shutdown_rx.clone();

        let poll_task = tokio::spawn(async move {
            let mut delay = poll_offline;

            loop {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {
                        // 소켓이 살아 있으면 소켓 상태가 진실 — 폴링 생략
                        if session.is_stopped() {
                            match api.ping().await {
                                Ok(()) => {
                                    connectivity.record_success();
                                    delay = poll_online;
                                }
                                Err(e) => {
                                    debug!("핑 실패: {e}");
                                    connectivity.record_failure();
                                    delay = poll_offline;
                                }
                            }
                        }

                        // 컴패니언 노드 존재 확인 — 부재는 정상 상황
                        let watch_connected = match companion.connected_nodes().await {
                            Ok(nodes) => !nodes.is_empty(),
                            Err(e) => {
                                debug!("컴패니언 노드 조회 실패: {e}");
                                false
                            }
                        };
                        let _ = companion_tx.send(watch_connected);
                    }
                    _ = shutdown2.changed() => {
                        info!("폴링 루프 종료");
                        break;
                    }
                }
            }
        });

        // ============================================================
        // 종료 대기
        // ============================================================
        let _ = shutdown_rx.changed().await;
        info!("슈퍼바이저 종료 신호 수신");

        refresh_task.abort();
        poll_task.abort();
    }
}
