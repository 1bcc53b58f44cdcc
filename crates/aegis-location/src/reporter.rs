//! 위치 보고 루프.
//!
//! 알람이 활성인 동안 고정 주기로 좌표를 샘플링해 세션으로 전달한다.
//! 최초 기동 시에는 첫 주기 틱을 기다리지 않고 즉시 startup 샘플을
//! 보낸다 (출동 지연 최소화). N틱마다 한 번은 샘플 대신 토큰 신선도
//! 점검을 수행하며, 인증 실패만이 루프를 중단시킨다 — 샘플 단위 전송
//! 실패는 로그 후 계속 진행한다.

use aegis_core::models::wire::{CancelNotice, PeriodicReport, ReconnectPing, StartupReport};
use aegis_core::ports::credential_store::CredentialStore;
use aegis_core::ports::location::LocationProvider;
use aegis_network::auth::TokenGatekeeper;
use aegis_network::session::SocketSession;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// 보고 루프 설정
#[derive(Debug, Clone)]
pub struct ReporterConfig {
    /// 위치 샘플 전송 주기
    pub update_interval: Duration,
    /// 토큰 점검을 수행할 틱 간격 (N틱마다 1회)
    pub check_interval_count: u64,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            update_interval: Duration::from_secs(10),
            check_interval_count: 3,
        }
    }
}

/// 루프 종료 사유
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReporterExit {
    /// 외부 셧다운 신호로 취소됨
    Cancelled,
    /// 백엔드가 신고 종료를 통보함
    ReportFinished,
    /// 인증 실패 (리프레시 만료 또는 갱신 실패) — 재로그인 필요
    Unauthorized,
}

/// 위치 보고 루프
pub struct LocationReporter {
    session: Arc<SocketSession>,
    gatekeeper: Arc<TokenGatekeeper>,
    provider: Arc<dyn LocationProvider>,
    store: Arc<dyn CredentialStore>,
    config: ReporterConfig,
}

impl LocationReporter {
    /// 새 보고 루프 생성
    pub fn new(
        session: Arc<SocketSession>,
        gatekeeper: Arc<TokenGatekeeper>,
        provider: Arc<dyn LocationProvider>,
        store: Arc<dyn CredentialStore>,
        config: ReporterConfig,
    ) -> Self {
        Self {
            session,
            gatekeeper,
            provider,
            store,
            config,
        }
    }

    /// 루프 실행.
    ///
    /// 세션을 연결하고 startup 샘플을 즉시 보낸 뒤, 주기 틱마다 위치를
    /// 전달한다. 셧다운/신고 종료/인증 실패 시 정리 후 반환한다.
    pub async fn run(&self, mut shutdown_rx: watch::Receiver<bool>) -> ReporterExit {
        let user_id = match self.store.user() {
            Some(user) => user.id,
            None => {
                warn!("로그인된 사용자 없음 — 보고 루프 시작 불가");
                return ReporterExit::Unauthorized;
            }
        };

        // 백엔드 "finished" 신호 → 루프 정지
        let (finish_tx, mut finish_rx) = watch::channel(false);
        self.session.set_on_report_finished(move || {
            let _ = finish_tx.send(true);
        });

        if let Err(e) = self.session.connect().await {
            // 연결 실패는 세션이 스스로 재연결한다 — 루프는 계속 돈다
            warn!("초기 연결 실패 (재연결 예약됨): {e}");
        }
        self.send_startup(user_id).await;

        info!(
            "위치 보고 루프 시작: 주기 {:?}, 토큰 점검 {}틱마다",
            self.config.update_interval, self.config.check_interval_count
        );

        let mut interval = tokio::time::interval(self.config.update_interval);
        interval.tick().await; // 즉시 완료되는 첫 틱 소비 (startup은 이미 전송)
        let mut token_check_counter: u64 = 0;

        let exit = loop {
            tokio::select! {
                _ = interval.tick() => {
                    if token_check_counter >= self.config.check_interval_count {
                        // 이번 틱은 샘플 대신 토큰 점검
                        token_check_counter = 0;
                        if self.gatekeeper.is_refresh_expired() {
                            warn!("리프레시 토큰 만료 — 세션 종료 및 루프 정지");
                            self.session.disconnect().await;
                            break ReporterExit::Unauthorized;
                        }
                        if self.gatekeeper.refresh_if_needed().await.is_none() {
                            warn!("토큰 갱신 실패 — 세션 종료 및 루프 정지");
                            self.session.disconnect().await;
                            break ReporterExit::Unauthorized;
                        }
                    } else {
                        token_check_counter += 1;
                        self.send_sample(user_id).await;
                    }
                }
                _ = finish_rx.changed() => {
                    info!("신고 종료 통보 — 보고 루프 정지");
                    break ReporterExit::ReportFinished;
                }
                _ = shutdown_rx.changed() => {
                    info!("셧다운 신호 — 보고 루프 정지");
                    break ReporterExit::Cancelled;
                }
            }
        };

        self.teardown().await;
        exit
    }

    /// startup 샘플 전송 — 첫 주기 틱을 기다리지 않는다
    async fn send_startup(&self, user_id: i64) {
        let sample = match self.provider.current().await {
            Ok(sample) => sample,
            Err(e) => {
                warn!("초기 위치 샘플 실패: {e}");
                return;
            }
        };

        match serde_json::to_string(&StartupReport::new(user_id, sample)) {
            Ok(payload) => match self.session.send(&payload).await {
                Ok(true) => debug!("startup 샘플 전송 완료"),
                Ok(false) => debug!("startup 샘플 폐기 (미연결)"),
                Err(e) => warn!("startup 샘플 전송 실패: {e}"),
            },
            Err(e) => warn!("startup 샘플 직렬화 실패: {e}"),
        }
    }

    /// 주기 샘플 전송.
    ///
    /// 재연결 대기 중이면 일반 보고 대신 reconnect 변형을 보낸다
    /// ("신고를 재개해 달라"는 신호). 활성 신고가 없으면 보내지 않는다.
    /// 전송 실패는 샘플 단위로 무시된다 — 루프는 계속 돌아야 한다.
    async fn send_sample(&self, user_id: i64) {
        let sample = match self.provider.current().await {
            Ok(sample) => sample,
            Err(e) => {
                warn!("위치 샘플 실패: {e}");
                return;
            }
        };

        let payload = if self.session.is_connecting() {
            serde_json::to_string(&ReconnectPing::new(user_id, sample))
        } else {
            let report_id = self.session.last_report_id();
            if report_id == -1 {
                return;
            }
            serde_json::to_string(&PeriodicReport::new(report_id, user_id, sample))
        };

        match payload {
            Ok(payload) => {
                if let Err(e) = self.session.send(&payload).await {
                    warn!("위치 전송 실패: {e}");
                }
            }
            Err(e) => warn!("위치 직렬화 실패: {e}"),
        }
    }

    /// 루프 정리.
    ///
    /// 활성 신고가 있으면 best-effort 취소 통지를 보내고 4000 close
    /// 코드로 세션을 닫아 백엔드가 신고를 정리할 수 있게 한다.
    async fn teardown(&self) {
        let report_id = self.session.last_report_id();
        if report_id != -1 {
            if let Ok(payload) = serde_json::to_string(&CancelNotice::new(report_id)) {
                if let Err(e) = self.session.send(&payload).await {
                    warn!("취소 통지 전송 실패: {e}");
                }
            }
            self.session.set_close_code(aegis_core::models::wire::CLOSE_CANCEL_WITH_REPORT);
        }
        self.session.disconnect().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_core::models::customer::Customer;
    use aegis_core::ports::transport::TransportEvent;
    use aegis_network::testing::{test_jwt, MockConnector};
    use aegis_storage::MemoryCredentialStore;
    use chrono::{Duration as ChronoDuration, Utc};

    use crate::provider::FixedLocationProvider;

    fn test_customer() -> Customer {
        Customer {
            id: 12,
            login: "jkowalski".to_string(),
            password: String::new(),
            name: "Jan".to_string(),
            surname: "Kowalski".to_string(),
            phone: "+48123123123".to_string(),
            pesel: "90010112345".to_string(),
            email: "jan@example.com".to_string(),
            account_deleted: false,
            protection_expiration_date: Some("2030-06-01T00:00:00".to_string()),
            token: Some(test_jwt(Utc::now() + ChronoDuration::hours(1))),
        }
    }

    struct Harness {
        connector: Arc<MockConnector>,
        reporter: Arc<LocationReporter>,
        session: Arc<SocketSession>,
        shutdown_tx: watch::Sender<bool>,
        shutdown_rx: watch::Receiver<bool>,
    }

    fn harness(refresh_expired: bool, check_interval_count: u64) -> Harness {
        let connector = Arc::new(MockConnector::default());
        let store = Arc::new(MemoryCredentialStore::new());
        store.save_user(&test_customer()).unwrap();
        let refresh_exp = if refresh_expired {
            Utc::now() - ChronoDuration::days(1)
        } else {
            Utc::now() + ChronoDuration::days(7)
        };
        store.save_refresh_token(&test_jwt(refresh_exp)).unwrap();

        let session = SocketSession::new(
            connector.clone(),
            store.clone(),
            "wss://test/clientSocket",
            Duration::from_secs(5),
            16,
        );
        let gatekeeper = Arc::new(TokenGatekeeper::new(
            "http://127.0.0.1:1",
            store.clone(),
            Duration::from_secs(60),
        ));
        let provider = Arc::new(FixedLocationProvider::new(52.1, 21.0));
        let reporter = Arc::new(LocationReporter::new(
            session.clone(),
            gatekeeper,
            provider,
            store,
            ReporterConfig {
                update_interval: Duration::from_secs(10),
                check_interval_count,
            },
        ));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Harness {
            connector,
            reporter,
            session,
            shutdown_tx,
            shutdown_rx,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn startup_sample_sent_immediately() {
        let h = harness(false, 3);
        let reporter = h.reporter.clone();
        let rx = h.shutdown_rx.clone();
        let task = tokio::spawn(async move { reporter.run(rx).await });

        tokio::time::sleep(Duration::from_millis(10)).await;

        let sent = h.connector.sent_messages();
        assert_eq!(sent.len(), 1);
        let value: serde_json::Value = serde_json::from_str(&sent[0]).unwrap();
        assert_eq!(value["callReport"], true);
        assert_eq!(value["userId"], 12);
        assert_eq!(value["latitude"], 52.1);

        h.shutdown_tx.send(true).unwrap();
        assert_eq!(task.await.unwrap(), ReporterExit::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_samples_tagged_with_report_id() {
        let h = harness(false, 100);
        let reporter = h.reporter.clone();
        let rx = h.shutdown_rx.clone();
        let task = tokio::spawn(async move { reporter.run(rx).await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        h.connector
            .inject(TransportEvent::Text(r#"{"reportId": 42}"#.to_string()))
            .await;

        tokio::time::sleep(Duration::from_secs(11)).await;

        let sent = h.connector.sent_messages();
        let last: serde_json::Value = serde_json::from_str(sent.last().unwrap()).unwrap();
        assert_eq!(last["reportId"], 42);
        assert_eq!(last["userId"], 12);
        assert_eq!(last["latitude"], 52.1);
        assert_eq!(last["longitude"], 21.0);

        h.shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_variant_while_resume_pending() {
        let h = harness(false, 100);
        let reporter = h.reporter.clone();
        let rx = h.shutdown_rx.clone();
        let task = tokio::spawn(async move { reporter.run(rx).await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        h.connector
            .inject(TransportEvent::Text(r#"{"reportId": 42}"#.to_string()))
            .await;

        // 장애 → 5초 후 전송 재수립, 서버 재개 확인 전 = connecting 창
        h.connector
            .inject(TransportEvent::Failure("reset".to_string()))
            .await;
        assert!(h.session.is_connecting());

        tokio::time::sleep(Duration::from_secs(21)).await;

        let sent = h.connector.sent_messages();
        let reconnects: Vec<_> = sent
            .iter()
            .filter(|m| m.contains("reconnectMessage"))
            .collect();
        assert!(!reconnects.is_empty());
        let value: serde_json::Value = serde_json::from_str(reconnects[0]).unwrap();
        assert_eq!(value["reconnectMessage"], true);
        assert_eq!(value["userId"], 12);

        h.shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn expired_refresh_token_terminates_loop() {
        // 점검 틱(2번째 틱)에서 만료 감지 → 세션 종료 + Unauthorized
        let h = harness(true, 1);
        let reporter = h.reporter.clone();
        let rx = h.shutdown_rx.clone();
        let task = tokio::spawn(async move { reporter.run(rx).await });

        tokio::time::sleep(Duration::from_secs(25)).await;

        assert_eq!(task.await.unwrap(), ReporterExit::Unauthorized);
        assert!(h.session.is_stopped());
        assert!(!h.session.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_sends_cancel_notice_and_4000() {
        let h = harness(false, 100);
        let reporter = h.reporter.clone();
        let rx = h.shutdown_rx.clone();
        let task = tokio::spawn(async move { reporter.run(rx).await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        h.connector
            .inject(TransportEvent::Text(r#"{"reportId": 42}"#.to_string()))
            .await;

        h.shutdown_tx.send(true).unwrap();
        assert_eq!(task.await.unwrap(), ReporterExit::Cancelled);

        let sent = h.connector.sent_messages();
        let cancel: serde_json::Value = serde_json::from_str(sent.last().unwrap()).unwrap();
        assert_eq!(cancel["reportId"], 42);
        assert_eq!(cancel["status"], "cancel");

        let closes = h.connector.close_calls();
        assert_eq!(closes.len(), 1);
        assert_eq!(closes[0].0, 4000);
        assert!(closes[0].1.contains("42"));
    }

    #[tokio::test(start_paused = true)]
    async fn finished_signal_stops_loop_with_plain_close() {
        let h = harness(false, 100);
        let reporter = h.reporter.clone();
        let rx = h.shutdown_rx.clone();
        let task = tokio::spawn(async move { reporter.run(rx).await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        h.connector
            .inject(TransportEvent::Text(r#"{"reportId": 42}"#.to_string()))
            .await;
        h.connector
            .inject(TransportEvent::Text(r#"{"status": "finished"}"#.to_string()))
            .await;

        assert_eq!(task.await.unwrap(), ReporterExit::ReportFinished);
        // 신고가 이미 종료되었으므로 일반 종료 코드
        let closes = h.connector.close_calls();
        assert_eq!(closes.len(), 1);
        assert_eq!(closes[0].0, 1000);
    }
}
