//! 연결 상태 모니터.
//!
//! 세션이 의도적으로 닫혀 있는 동안 REST 핑 결과를 집계해 도달
//! 가능성을 추적한다. 폴링 자체는 앱의 슈퍼바이저 루프가 수행한다.

use aegis_core::models::session::ConnectionStatus;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// 연결 상태 모니터
///
/// 연속 실패가 임계값에 도달하면 오프라인으로 전환하고,
/// 상태 변화를 `watch` 채널로 브로드캐스트한다.
pub struct ConnectivityMonitor {
    /// 현재 온라인 상태
    is_online: AtomicBool,
    /// 연속 실패 횟수
    failure_count: AtomicU64,
    /// 오프라인 전환 임계값
    offline_threshold: u64,
    status_tx: watch::Sender<ConnectionStatus>,
}

impl ConnectivityMonitor {
    /// 새 모니터 생성
    ///
    /// `offline_threshold`: 이 횟수만큼 연속 실패하면 오프라인 전환
    pub fn new(offline_threshold: u64) -> Self {
        let (status_tx, _) = watch::channel(ConnectionStatus::Connected);
        Self {
            is_online: AtomicBool::new(true),
            failure_count: AtomicU64::new(0),
            offline_threshold,
            status_tx,
        }
    }

    /// 현재 온라인 상태
    pub fn is_online(&self) -> bool {
        self.is_online.load(Ordering::Relaxed)
    }

    /// 현재 연결 상태
    pub fn status(&self) -> ConnectionStatus {
        *self.status_tx.borrow()
    }

    /// 상태 변경 수신기 생성
    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_tx.subscribe()
    }

    /// 연속 실패 횟수
    pub fn failure_count(&self) -> u64 {
        self.failure_count.load(Ordering::Relaxed)
    }

    /// 핑 성공 기록 — 온라인 전환 + 실패 카운터 리셋
    pub fn record_success(&self) {
        let was_offline = !self.is_online.swap(true, Ordering::Relaxed);
        self.failure_count.store(0, Ordering::Relaxed);

        if was_offline {
            info!("서버 도달 가능 — 온라인 전환");
            let _ = self.status_tx.send(ConnectionStatus::Connected);
        }
    }

    /// 핑 실패 기록 — 임계값 도달 시 오프라인 전환
    pub fn record_failure(&self) {
        let count = self.failure_count.fetch_add(1, Ordering::Relaxed) + 1;
        debug!("핑 실패 기록 (연속 {count}회)");

        if count >= self.offline_threshold {
            let was_online = self.is_online.swap(false, Ordering::Relaxed);
            if was_online {
                warn!("연속 {count}회 실패 — 오프라인 전환");
                let _ = self.status_tx.send(ConnectionStatus::Disconnected);
            }
        } else {
            let _ = self.status_tx.send(ConnectionStatus::Reconnecting);
        }
    }
}
