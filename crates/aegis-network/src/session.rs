//! 영속 소켓 세션 관리자.
//!
//! 디스패치 백엔드와의 단일 듀플렉스 연결을 소유한다.
//! connect/send/disconnect를 노출하고, 인바운드 제어 메시지를 필드
//! 존재 여부로 판별해 신고 생명주기로 디멀티플렉싱하며, 비정상 종료
//! 시 고정 지연 후 자동 재연결한다.
//!
//! 콜백 슬롯(on_start/on_close/on_report_finished)은 단일 슬롯이다:
//! 새 핸들러 등록은 이전 핸들러를 교체한다 (큐잉 아님).
//! 연결 상태와 신고 상태는 `watch` 채널로 발행되어 UI 표현과 코어를
//! 분리한다.

use aegis_core::error::CoreError;
use aegis_core::models::report::{ReportEvent, ReportState};
use aegis_core::models::session::ConnectionStatus;
use aegis_core::models::wire::{self, ServerMessage};
use aegis_core::ports::credential_store::CredentialStore;
use aegis_core::ports::transport::{DuplexConnection, DuplexConnector, TransportEvent};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// 전송 정책.
///
/// 위치 핑 같은 소멸성 텔레메트리는 `BestEffort`(미연결 시 폐기),
/// 전달이 필요한 메시지는 `Queued`(재연결 시 플러시)를 쓴다.
/// 취소처럼 반드시 서버에 닿아야 하는 신호는 close 코드 프로토콜을
/// 사용한다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendPolicy {
    /// at-most-once — 미연결 상태면 버퍼링 없이 폐기
    BestEffort,
    /// 미연결 상태면 유계 버퍼에 보관, (재)연결 시 순서대로 플러시
    Queued,
}

/// 콜백 슬롯 타입 — 등록은 교체, 큐잉 아님
type Callback = Arc<dyn Fn() + Send + Sync>;

/// 영속 소켓 세션
pub struct SocketSession {
    connector: Arc<dyn DuplexConnector>,
    store: Arc<dyn CredentialStore>,
    socket_url: String,
    reconnect_delay: Duration,
    send_queue_limit: usize,

    /// 단일 전송 핸들 — 세션만이 교체한다
    connection: Mutex<Option<Arc<dyn DuplexConnection>>>,
    connected: AtomicBool,
    /// 재연결 카운트다운 중 관찰 가능한 플래그
    connecting: AtomicBool,
    /// 의도적 종료와 장애를 구분
    stop_requested: AtomicBool,
    /// 활성 신고 id (-1 = 없음)
    last_report_id: AtomicI64,
    /// 1회용 close 코드 — 사용 후 소거
    pending_close_code: Mutex<Option<u16>>,
    /// 전송 세대 — 이전 연결의 잔여 이벤트가 상태를 건드리지 못하게 한다
    epoch: AtomicU64,

    send_queue: Mutex<VecDeque<String>>,

    on_start: Mutex<Option<Callback>>,
    on_close: Mutex<Option<Callback>>,
    on_report_finished: Mutex<Option<Callback>>,

    status_tx: watch::Sender<ConnectionStatus>,
    report_tx: watch::Sender<ReportState>,

    /// connect 임계 구역 직렬화 — 전송 인스턴스는 항상 1개
    connect_lock: tokio::sync::Mutex<()>,
    reconnect_task: Mutex<Option<JoinHandle<()>>>,
}

impl SocketSession {
    /// 새 세션 생성
    pub fn new(
        connector: Arc<dyn DuplexConnector>,
        store: Arc<dyn CredentialStore>,
        socket_url: &str,
        reconnect_delay: Duration,
        send_queue_limit: usize,
    ) -> Arc<Self> {
        let (status_tx, _) = watch::channel(ConnectionStatus::Disconnected);
        let (report_tx, _) = watch::channel(ReportState::None);

        Arc::new(Self {
            connector,
            store,
            socket_url: socket_url.to_string(),
            reconnect_delay,
            send_queue_limit,
            connection: Mutex::new(None),
            connected: AtomicBool::new(false),
            connecting: AtomicBool::new(false),
            stop_requested: AtomicBool::new(true),
            last_report_id: AtomicI64::new(-1),
            pending_close_code: Mutex::new(None),
            epoch: AtomicU64::new(0),
            send_queue: Mutex::new(VecDeque::new()),
            on_start: Mutex::new(None),
            on_close: Mutex::new(None),
            on_report_finished: Mutex::new(None),
            status_tx,
            report_tx,
            connect_lock: tokio::sync::Mutex::new(()),
            reconnect_task: Mutex::new(None),
        })
    }

    // ============================================================
    // 상태 관찰
    // ============================================================

    /// 연결 여부
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// 재연결 대기 중 여부
    pub fn is_connecting(&self) -> bool {
        self.connecting.load(Ordering::SeqCst)
    }

    /// 의도적 종료 상태 여부
    pub fn is_stopped(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    /// 활성 신고 id (-1 = 없음)
    pub fn last_report_id(&self) -> i64 {
        self.last_report_id.load(Ordering::SeqCst)
    }

    /// 현재 신고 상태
    pub fn report_state(&self) -> ReportState {
        *self.report_tx.borrow()
    }

    /// 연결 상태 스트림 구독
    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_tx.subscribe()
    }

    /// 신고 상태 스트림 구독
    pub fn subscribe_report_state(&self) -> watch::Receiver<ReportState> {
        self.report_tx.subscribe()
    }

    // ============================================================
    // 콜백 슬롯 — 등록은 이전 핸들러를 교체한다
    // ============================================================

    /// 신고 시작/재개 콜백 등록
    pub fn set_on_start(&self, callback: impl Fn() + Send + Sync + 'static) {
        *self.on_start.lock() = Some(Arc::new(callback));
    }

    /// 종료 직전 콜백 등록 — 전송이 닫히기 전에 실행 완료가 보장된다
    pub fn set_on_close(&self, callback: impl Fn() + Send + Sync + 'static) {
        *self.on_close.lock() = Some(Arc::new(callback));
    }

    /// 백엔드 "finished" 신호 콜백 등록
    pub fn set_on_report_finished(&self, callback: impl Fn() + Send + Sync + 'static) {
        *self.on_report_finished.lock() = Some(Arc::new(callback));
    }

    /// 1회용 close 코드 등록 (다음 disconnect에서 사용 후 소거)
    pub fn set_close_code(&self, code: u16) {
        *self.pending_close_code.lock() = Some(code);
    }

    // ============================================================
    // 연결 수명주기
    // ============================================================

    /// 연결 수립.
    ///
    /// 이미 연결된 상태면 no-op (두 번째 전송 인스턴스를 만들지 않는다).
    /// 대기 중인 재연결 카운트다운은 취소된다.
    pub async fn connect(self: &Arc<Self>) -> Result<(), CoreError> {
        let _guard = self.connect_lock.lock().await;

        if self.is_connected() {
            debug!("이미 연결됨 — connect 무시");
            return Ok(());
        }

        self.stop_requested.store(false, Ordering::SeqCst);
        *self.pending_close_code.lock() = None;
        self.abort_pending_reconnect();

        let token = self.store.access_token().unwrap_or_default();
        let (events_tx, events_rx) = mpsc::channel(64);

        match self
            .connector
            .connect(&self.socket_url, &token, events_tx)
            .await
        {
            Ok(connection) => {
                // 핸드셰이크 도중 disconnect가 들어온 경우 즉시 되돌린다
                if self.stop_requested.load(Ordering::SeqCst) {
                    let _ = connection.close(wire::CLOSE_NORMAL, "Disconnect").await;
                    return Ok(());
                }

                let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
                *self.connection.lock() = Some(Arc::from(connection));
                self.mark_transport_connected();
                self.spawn_dispatch(events_rx, epoch);
                info!("소켓 연결 수립");
                Ok(())
            }
            Err(e) => {
                warn!("소켓 연결 실패: {e}");
                if !self.stop_requested.load(Ordering::SeqCst) {
                    self.schedule_reconnect();
                }
                Err(e)
            }
        }
    }

    /// 연결 종료.
    ///
    /// on-close 콜백이 전송 종료 전에 실행 완료된다. 등록된 1회용
    /// close 코드가 4000이면 활성 신고 id를 사유 페이로드에 동봉한다.
    /// 신고 id와 close 코드는 항상 초기화된다.
    pub async fn disconnect(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
        self.abort_pending_reconnect();
        self.connecting.store(false, Ordering::SeqCst);

        if self.connected.swap(false, Ordering::SeqCst) {
            // 상위 상태(UI/브리지)가 먼저 반응할 기회를 준다
            self.fire(&self.on_close);

            let connection = self.connection.lock().take();
            let close_code = self.pending_close_code.lock().take();
            if let Some(connection) = connection {
                let result = match close_code {
                    Some(wire::CLOSE_CANCEL_WITH_REPORT) => {
                        let reason = wire::cancel_close_reason(self.last_report_id());
                        connection
                            .close(wire::CLOSE_CANCEL_WITH_REPORT, &reason)
                            .await
                    }
                    Some(code) => connection.close(code, "Disconnect").await,
                    None => connection.close(wire::CLOSE_NORMAL, "Disconnect").await,
                };
                if let Err(e) = result {
                    warn!("소켓 종료 실패: {e}");
                }
            }
            info!("소켓 연결 종료");
        } else {
            *self.connection.lock() = None;
        }

        self.last_report_id.store(-1, Ordering::SeqCst);
        *self.pending_close_code.lock() = None;
        self.apply_report_event(ReportEvent::Finished);
        let _ = self.status_tx.send(ConnectionStatus::Disconnected);
    }

    // ============================================================
    // 전송
    // ============================================================

    /// BestEffort 전송 — 미연결 상태면 폐기하고 `Ok(false)` 반환
    pub async fn send(&self, text: &str) -> Result<bool, CoreError> {
        self.send_with(text, SendPolicy::BestEffort).await
    }

    /// 정책 지정 전송.
    ///
    /// 반환값은 즉시 전달 여부. `Queued`로 버퍼에 들어간 경우 `Ok(false)`.
    pub async fn send_with(&self, text: &str, policy: SendPolicy) -> Result<bool, CoreError> {
        let connection = self.connection.lock().clone();
        match (self.is_connected(), connection) {
            (true, Some(connection)) => {
                connection.send_text(text).await?;
                Ok(true)
            }
            _ => match policy {
                SendPolicy::BestEffort => {
                    debug!("미연결 상태 — 메시지 폐기");
                    Ok(false)
                }
                SendPolicy::Queued => {
                    let mut queue = self.send_queue.lock();
                    if queue.len() >= self.send_queue_limit {
                        warn!("전송 버퍼 가득 참 — 가장 오래된 메시지 폐기");
                        queue.pop_front();
                    }
                    queue.push_back(text.to_string());
                    Ok(false)
                }
            },
        }
    }

    /// 버퍼된 메시지를 순서대로 플러시 ((재)연결 직후)
    async fn flush_queue(&self) {
        let pending: Vec<String> = {
            let mut queue = self.send_queue.lock();
            queue.drain(..).collect()
        };
        if pending.is_empty() {
            return;
        }

        debug!("버퍼 플러시: {}건", pending.len());
        for text in pending {
            let connection = self.connection.lock().clone();
            match connection {
                Some(connection) => {
                    if let Err(e) = connection.send_text(&text).await {
                        warn!("버퍼 플러시 실패: {e}");
                        break;
                    }
                }
                None => break,
            }
        }
    }

    // ============================================================
    // 인바운드 이벤트 처리
    // ============================================================

    /// 연결별 디스패치 태스크 — 이벤트를 도착 순서대로 처리
    fn spawn_dispatch(self: &Arc<Self>, mut events_rx: mpsc::Receiver<TransportEvent>, epoch: u64) {
        let session = self.clone();
        tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                session.handle_event(event, epoch).await;
            }
            debug!("디스패치 태스크 종료 (세대 {epoch})");
        });
    }

    async fn handle_event(self: &Arc<Self>, event: TransportEvent, epoch: u64) {
        // 교체된 연결의 잔여 이벤트는 무시
        if epoch != self.epoch.load(Ordering::SeqCst) {
            return;
        }

        match event {
            TransportEvent::Open => {
                self.mark_transport_connected();
                self.flush_queue().await;
            }
            TransportEvent::Text(text) => {
                self.handle_message(&text);
            }
            TransportEvent::Closed { code } => {
                debug!("소켓 종료 수신 (code={code:?})");
                self.on_transport_lost();
            }
            TransportEvent::Failure(reason) => {
                warn!("소켓 장애: {reason}");
                self.on_transport_lost();
            }
        }
    }

    /// 인바운드 제어 메시지 디스패치 — 형태는 필드 존재 여부로 판별.
    /// 미지의 형태는 무시한다 (전방 호환).
    fn handle_message(&self, text: &str) {
        let message: ServerMessage = match serde_json::from_str(text) {
            Ok(parsed) => parsed,
            Err(e) => {
                debug!("해석 불가 메시지 무시: {e}");
                return;
            }
        };

        if let Some(report_id) = message.report_id {
            info!("신고 시작: reportId={report_id}");
            self.last_report_id.store(report_id, Ordering::SeqCst);
            self.apply_report_event(ReportEvent::Started);
            self.fire(&self.on_start);
            self.mark_resumed();
        }

        if let Some(status) = message.status.as_deref() {
            match status {
                "finished" => {
                    info!("신고 종료 신호 수신");
                    self.last_report_id.store(-1, Ordering::SeqCst);
                    self.apply_report_event(ReportEvent::Finished);
                    self.fire(&self.on_report_finished);
                }
                "reconnected" => {
                    info!("세션 재개 확인");
                    self.mark_resumed();
                    self.fire(&self.on_start);
                }
                "confirmed" => {
                    self.apply_report_event(ReportEvent::Confirmed);
                }
                "waiting" => {
                    self.apply_report_event(ReportEvent::Waiting);
                }
                other => {
                    debug!("알 수 없는 상태 무시: {other}");
                }
            }
        }
    }

    /// 신고 상태 전이 적용 및 변경 시 발행
    fn apply_report_event(&self, event: ReportEvent) {
        let report_active = self.last_report_id() != -1;
        self.report_tx.send_if_modified(|state| {
            let next = state.apply(event, report_active);
            if next != *state {
                debug!("신고 상태 전이: {state} → {next}");
                *state = next;
                true
            } else {
                false
            }
        });
    }

    /// 전송 수립 마킹 — `connecting`은 건드리지 않는다.
    /// 재연결 직후에도 서버가 신고 재개를 확인(reportId/"reconnected")할
    /// 때까지는 재연결 대기로 관찰되어야 한다 (reconnect 핑 전송 창).
    fn mark_transport_connected(&self) {
        self.connected.store(true, Ordering::SeqCst);
        let _ = self.status_tx.send(ConnectionStatus::Connected);
    }

    /// 서버가 세션 재개를 확인 — 재연결 대기 해제
    fn mark_resumed(&self) {
        self.connected.store(true, Ordering::SeqCst);
        self.connecting.store(false, Ordering::SeqCst);
        let _ = self.status_tx.send(ConnectionStatus::Connected);
    }

    /// 비정상 연결 상실 처리 — 의도적 종료가 아니면 재연결 예약
    fn on_transport_lost(self: &Arc<Self>) {
        self.connected.store(false, Ordering::SeqCst);
        *self.connection.lock() = None;

        if self.stop_requested.load(Ordering::SeqCst) {
            // 의도적 종료 — 도달 가능성은 외부 폴러가 반영한다
            let _ = self.status_tx.send(ConnectionStatus::Disconnected);
        } else {
            self.schedule_reconnect();
        }
    }

    /// 고정 지연 후 재연결 예약.
    ///
    /// 카운트다운 동안 `connecting=true`가 관찰된다. disconnect가
    /// 들어오면 카운트다운이 취소되고 connect는 호출되지 않는다.
    fn schedule_reconnect(self: &Arc<Self>) {
        self.connecting.store(true, Ordering::SeqCst);
        let _ = self.status_tx.send(ConnectionStatus::Reconnecting);

        let session = self.clone();
        let delay = self.reconnect_delay;
        let mut task = self.reconnect_task.lock();
        if let Some(previous) = task.take() {
            previous.abort();
        }
        *task = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if !session.stop_requested.load(Ordering::SeqCst) {
                debug!("재연결 시도");
                if let Err(e) = session.connect().await {
                    warn!("재연결 실패: {e}");
                }
            }
        }));
    }

    fn abort_pending_reconnect(&self) {
        if let Some(task) = self.reconnect_task.lock().take() {
            task.abort();
        }
    }

    /// 콜백 슬롯 실행 — 슬롯 락은 호출 전에 해제된다
    fn fire(&self, slot: &Mutex<Option<Callback>>) {
        let callback = slot.lock().clone();
        if let Some(callback) = callback {
            callback();
        }
    }
}
