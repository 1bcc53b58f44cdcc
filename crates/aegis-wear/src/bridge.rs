//! 워치 브리지.
//!
//! 인바운드: `/check_token`, `/start_sos`, `/end_sos` 요청을 로컬 세션
//! 동작으로 변환한다. 아웃바운드: 신고 상태 변화와 시작/종료 콜백을
//! 워치행 상태 문자열로 푸시한다.
//!
//! 노드 해석은 비동기이며 실패할 수 있다. 연결된 노드가 없으면
//! 로그만 남기고 no-op — 절대 에러로 전파하지 않는다.

use aegis_core::models::report::ReportState;
use aegis_core::models::wear::{paths, replies, CompanionMessage};
use aegis_core::ports::companion::CompanionTransport;
use aegis_core::ports::credential_store::CredentialStore;
use aegis_core::ports::reporting::SosReporting;
use aegis_network::auth::TokenGatekeeper;
use aegis_network::session::SocketSession;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// 워치로 메시지 전송 — 첫 번째 연결 노드 대상.
/// 노드가 없거나 전송에 실패하면 로그만 남긴다.
async fn send_to_companion(transport: &dyn CompanionTransport, path: &str, text: &str) {
    let nodes = match transport.connected_nodes().await {
        Ok(nodes) => nodes,
        Err(e) => {
            warn!("컴패니언 노드 조회 실패: {e}");
            return;
        }
    };
    let Some(node_id) = nodes.first() else {
        warn!("연결된 컴패니언 노드 없음 — {path} 전송 생략");
        return;
    };
    if let Err(e) = transport.send_message(node_id, path, text.as_bytes()).await {
        warn!("컴패니언 전송 실패 ({path}): {e}");
    }
}

/// 콜백 컨텍스트에서 쓰는 비동기 전송 태스크
fn spawn_companion_send(transport: Arc<dyn CompanionTransport>, path: &'static str, text: &'static str) {
    tokio::spawn(async move {
        send_to_companion(transport.as_ref(), path, text).await;
    });
}

/// 워치 브리지
pub struct WearBridge {
    transport: Arc<dyn CompanionTransport>,
    session: Arc<SocketSession>,
    gatekeeper: Arc<TokenGatekeeper>,
    store: Arc<dyn CredentialStore>,
    reporting: Arc<dyn SosReporting>,
    /// 워치 기준 SOS 활성 플래그
    sos_active: Arc<AtomicBool>,
}

impl WearBridge {
    /// 새 브리지 생성
    pub fn new(
        transport: Arc<dyn CompanionTransport>,
        session: Arc<SocketSession>,
        gatekeeper: Arc<TokenGatekeeper>,
        store: Arc<dyn CredentialStore>,
        reporting: Arc<dyn SosReporting>,
    ) -> Arc<Self> {
        Arc::new(Self {
            transport,
            session,
            gatekeeper,
            store,
            reporting,
            sos_active: Arc::new(AtomicBool::new(false)),
        })
    }

    /// SOS 활성 여부
    pub fn is_sos_active(&self) -> bool {
        self.sos_active.load(Ordering::SeqCst)
    }

    /// 브리지 실행: 워치 요청 수신 + 신고 상태 푸시
    pub async fn run(self: Arc<Self>, mut shutdown_rx: watch::Receiver<bool>) {
        let (msg_tx, mut msg_rx) = mpsc::channel(16);
        let transport = self.transport.clone();
        let listen_task = tokio::spawn(async move {
            if let Err(e) = transport.listen(msg_tx).await {
                warn!("컴패니언 수신 실패: {e}");
            }
        });

        let mut report_rx = self.session.subscribe_report_state();
        info!("워치 브리지 시작");

        loop {
            tokio::select! {
                message = msg_rx.recv() => {
                    match message {
                        Some(message) => self.handle_message(message).await,
                        None => {
                            debug!("컴패니언 수신 채널 종료");
                            break;
                        }
                    }
                }
                changed = report_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let state = *report_rx.borrow_and_update();
                    self.push_sos_status(state).await;
                }
                _ = shutdown_rx.changed() => {
                    info!("워치 브리지 종료");
                    break;
                }
            }
        }

        listen_task.abort();
    }

    /// 인바운드 워치 요청 디스패치
    pub async fn handle_message(&self, message: CompanionMessage) {
        debug!("워치 요청: {}", message.path);
        match message.path.as_str() {
            paths::CHECK_TOKEN => self.handle_check_token().await,
            paths::START_SOS => self.handle_start_sos().await,
            paths::END_SOS => self.handle_end_sos().await,
            other => {
                warn!("알 수 없는 워치 요청 무시: {other}");
            }
        }
    }

    /// `/check_token`: 토큰 유효성 + 보호 기간 + 신고 상태의 합성 문자열 응답
    async fn handle_check_token(&self) {
        let valid = if self.gatekeeper.is_refresh_expired() {
            false
        } else {
            let _ = self.gatekeeper.refresh_if_needed().await;
            true
        };

        let protection_active = self
            .store
            .user()
            .map(|user| user.is_protection_active(chrono::Local::now().naive_local()))
            .unwrap_or(false);

        let mut status = String::from(if valid { replies::VALID } else { replies::INVALID });
        if !protection_active {
            status.push(' ');
            status.push_str(replies::PROTECTION_EXPIRED);
        }
        status.push_str(&format!(" status_{}", self.session.report_state()));

        self.reply(paths::TOKEN_STATUS, &status).await;
    }

    /// `/start_sos`: 보호 기간이 유효하면 보고 루프를 시작하고,
    /// 세션의 신고 시작 콜백으로 워치에 "started"를 확인 응답한다.
    async fn handle_start_sos(&self) {
        let Some(user) = self.store.user() else {
            self.reply(paths::START_SOS, replies::NO_LOGGED_IN).await;
            return;
        };
        if user.protection_expiration_date.is_none() {
            self.reply(paths::START_SOS, replies::NO_LOGGED_IN).await;
            return;
        }

        if user.is_protection_active(chrono::Local::now().naive_local()) {
            let transport = self.transport.clone();
            let sos_active = self.sos_active.clone();
            self.session.set_on_start(move || {
                sos_active.store(true, Ordering::SeqCst);
                spawn_companion_send(transport.clone(), paths::START_SOS, replies::STARTED);
            });

            if let Err(e) = self.reporting.start_reporting().await {
                warn!("보고 루프 시작 실패: {e}");
            }
        } else {
            self.reply(paths::START_SOS, replies::PROTECTION_EXPIRED).await;
        }
    }

    /// `/end_sos`: 깨끗한 취소를 위한 close 코드를 등록하고 보고
    /// 루프를 정지시킨다. 세션 종료 콜백이 워치에 "stopped"를 응답한다.
    async fn handle_end_sos(&self) {
        let transport = self.transport.clone();
        let sos_active = self.sos_active.clone();
        self.session.set_on_close(move || {
            sos_active.store(false, Ordering::SeqCst);
            spawn_companion_send(transport.clone(), paths::END_SOS, replies::STOPPED);
        });

        self.session
            .set_close_code(aegis_core::models::wire::CLOSE_CANCEL_WITH_REPORT);

        if let Err(e) = self.reporting.stop_reporting().await {
            warn!("보고 루프 정지 실패: {e}");
        }
    }

    /// 신고 상태 변화 푸시
    async fn push_sos_status(&self, state: ReportState) {
        let text = match state {
            ReportState::None => "finished",
            ReportState::Waiting => "waiting",
            ReportState::Confirmed => "confirmed",
        };
        self.reply(paths::SOS_STATUS, text).await;
    }

    async fn reply(&self, path: &str, text: &str) {
        send_to_companion(self.transport.as_ref(), path, text).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::InProcessCompanionTransport;
    use aegis_core::error::CoreError;
    use aegis_core::models::customer::Customer;
    use aegis_core::ports::transport::TransportEvent;
    use aegis_network::testing::{test_jwt, MockConnector};
    use aegis_storage::MemoryCredentialStore;
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, Utc};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::time::timeout;

    struct MockReporting {
        starts: AtomicUsize,
        stops: AtomicUsize,
    }

    impl MockReporting {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                starts: AtomicUsize::new(0),
                stops: AtomicUsize::new(0),
            })
        }

        fn start_count(&self) -> usize {
            self.starts.load(Ordering::SeqCst)
        }

        fn stop_count(&self) -> usize {
            self.stops.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SosReporting for MockReporting {
        async fn start_reporting(&self) -> Result<(), CoreError> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn stop_reporting(&self) -> Result<(), CoreError> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn is_reporting(&self) -> bool {
            self.start_count() > self.stop_count()
        }
    }

    fn customer(protection_expiration_date: Option<&str>) -> Customer {
        Customer {
            id: 7,
            login: "jkowalski".to_string(),
            password: String::new(),
            name: "Jan".to_string(),
            surname: "Kowalski".to_string(),
            phone: "+48123123123".to_string(),
            pesel: "90010112345".to_string(),
            email: "jan@example.com".to_string(),
            account_deleted: false,
            protection_expiration_date: protection_expiration_date.map(|s| s.to_string()),
            token: Some(test_jwt(Utc::now() + ChronoDuration::hours(1))),
        }
    }

    struct Harness {
        bridge: Arc<WearBridge>,
        connector: Arc<MockConnector>,
        session: Arc<SocketSession>,
        reporting: Arc<MockReporting>,
        to_watch: mpsc::Receiver<CompanionMessage>,
        from_watch: mpsc::Sender<CompanionMessage>,
        _shutdown_tx: watch::Sender<bool>,
    }

    /// 브리지 + 모의 세션/전송 구성, run 태스크 기동
    fn harness(user: Option<Customer>, refresh_expired: bool) -> Harness {
        let connector = Arc::new(MockConnector::default());
        let store = Arc::new(MemoryCredentialStore::new());
        if let Some(user) = &user {
            store.save_user(user).unwrap();
        }
        let refresh_exp = if refresh_expired {
            Utc::now() - ChronoDuration::days(1)
        } else {
            Utc::now() + ChronoDuration::days(7)
        };
        store.save_refresh_token(&test_jwt(refresh_exp)).unwrap();
        store
            .save_access_token(&test_jwt(Utc::now() + ChronoDuration::hours(1)))
            .unwrap();

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
        let (transport, to_watch, from_watch) = InProcessCompanionTransport::new();
        let reporting = MockReporting::new();

        let bridge = WearBridge::new(
            transport,
            session.clone(),
            gatekeeper,
            store,
            reporting.clone(),
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(bridge.clone().run(shutdown_rx));

        Harness {
            bridge,
            connector,
            session,
            reporting,
            to_watch,
            from_watch,
            _shutdown_tx: shutdown_tx,
        }
    }

    async fn recv(h: &mut Harness) -> CompanionMessage {
        timeout(Duration::from_secs(2), h.to_watch.recv())
            .await
            .expect("워치 응답 대기 시간 초과")
            .expect("채널 종료")
    }

    #[tokio::test]
    async fn check_token_composes_valid_status() {
        let mut h = harness(Some(customer(Some("2030-06-01T00:00:00"))), false);

        h.from_watch
            .send(CompanionMessage::new(paths::CHECK_TOKEN, Vec::new()))
            .await
            .unwrap();

        let reply = recv(&mut h).await;
        assert_eq!(reply.path, paths::TOKEN_STATUS);
        let text = reply.payload_text();
        assert!(text.starts_with("valid"));
        assert!(!text.contains("protection_expired"));
        assert!(text.contains("status_NONE"));
    }

    #[tokio::test]
    async fn check_token_reports_invalid_and_expired_protection() {
        let mut h = harness(Some(customer(Some("2020-01-01T00:00:00"))), true);

        h.from_watch
            .send(CompanionMessage::new(paths::CHECK_TOKEN, Vec::new()))
            .await
            .unwrap();

        let reply = recv(&mut h).await;
        let text = reply.payload_text();
        assert!(text.starts_with("invalid"));
        assert!(text.contains("protection_expired"));
    }

    #[tokio::test]
    async fn start_sos_with_lapsed_protection_is_rejected() {
        // 보호 기간 만료 → "protection_expired", 위치 서비스 미기동
        let mut h = harness(Some(customer(Some("2020-01-01T00:00:00"))), false);

        h.from_watch
            .send(CompanionMessage::new(paths::START_SOS, Vec::new()))
            .await
            .unwrap();

        let reply = recv(&mut h).await;
        assert_eq!(reply.path, paths::START_SOS);
        assert_eq!(reply.payload_text(), replies::PROTECTION_EXPIRED);
        assert_eq!(h.reporting.start_count(), 0);
    }

    #[tokio::test]
    async fn start_sos_without_user_replies_no_logged_in() {
        let mut h = harness(None, false);

        h.from_watch
            .send(CompanionMessage::new(paths::START_SOS, Vec::new()))
            .await
            .unwrap();

        let reply = recv(&mut h).await;
        assert_eq!(reply.payload_text(), replies::NO_LOGGED_IN);
        assert_eq!(h.reporting.start_count(), 0);
    }

    #[tokio::test]
    async fn start_sos_starts_reporting_and_acks_on_report_start() {
        let mut h = harness(Some(customer(Some("2030-06-01T00:00:00"))), false);

        h.from_watch
            .send(CompanionMessage::new(paths::START_SOS, Vec::new()))
            .await
            .unwrap();

        // 보고 루프 기동 대기
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(h.reporting.start_count(), 1);
        assert!(!h.bridge.is_sos_active());

        // 서버가 신고 id를 내려주면 on-start 콜백이 워치에 확인 응답
        h.session.connect().await.unwrap();
        h.connector
            .inject(TransportEvent::Text(r#"{"reportId": 42}"#.to_string()))
            .await;

        // 상태 푸시(/sos_status)와 시작 확인(/start_sos) 둘 다 도착한다
        let mut started_ack = None;
        for _ in 0..2 {
            let reply = recv(&mut h).await;
            if reply.path == paths::START_SOS {
                started_ack = Some(reply.payload_text());
            }
        }
        assert_eq!(started_ack.as_deref(), Some(replies::STARTED));
        assert!(h.bridge.is_sos_active());
    }

    #[tokio::test]
    async fn end_sos_sets_cancel_close_code_and_acks_stopped() {
        let mut h = harness(Some(customer(Some("2030-06-01T00:00:00"))), false);

        // 활성 신고 상태 구성
        h.session.connect().await.unwrap();
        h.connector
            .inject(TransportEvent::Text(r#"{"reportId": 42}"#.to_string()))
            .await;
        let _status_push = recv(&mut h).await; // /sos_status waiting

        h.from_watch
            .send(CompanionMessage::new(paths::END_SOS, Vec::new()))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(h.reporting.stop_count(), 1);

        // 실제 종료는 보고 루프 teardown이 수행 — 여기서는 직접 종료
        h.session.disconnect().await;

        let closes = h.connector.close_calls();
        assert_eq!(closes.len(), 1);
        assert_eq!(closes[0].0, 4000);
        assert!(closes[0].1.contains("42"));

        // on-close 콜백이 워치에 "stopped"를 응답한다
        let mut stopped_ack = None;
        for _ in 0..2 {
            let reply = recv(&mut h).await;
            if reply.path == paths::END_SOS {
                stopped_ack = Some(reply.payload_text());
            }
        }
        assert_eq!(stopped_ack.as_deref(), Some(replies::STOPPED));
        assert!(!h.bridge.is_sos_active());
    }

    #[tokio::test]
    async fn report_state_changes_push_sos_status() {
        let mut h = harness(Some(customer(Some("2030-06-01T00:00:00"))), false);

        h.session.connect().await.unwrap();
        h.connector
            .inject(TransportEvent::Text(r#"{"reportId": 42}"#.to_string()))
            .await;

        let push = recv(&mut h).await;
        assert_eq!(push.path, paths::SOS_STATUS);
        assert_eq!(push.payload_text(), "waiting");

        h.connector
            .inject(TransportEvent::Text(r#"{"status": "confirmed"}"#.to_string()))
            .await;
        let push = recv(&mut h).await;
        assert_eq!(push.payload_text(), "confirmed");

        h.connector
            .inject(TransportEvent::Text(r#"{"status": "finished"}"#.to_string()))
            .await;
        let push = recv(&mut h).await;
        assert_eq!(push.payload_text(), "finished");
    }
}
