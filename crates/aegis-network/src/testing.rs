//! 테스트 더블.
//!
//! 소켓 세션/보고 루프/브리지 테스트가 공유하는 모의 전송 구현.
//! `test-support` feature로만 노출된다.

use aegis_core::error::CoreError;
use aegis_core::ports::transport::{DuplexConnection, DuplexConnector, TransportEvent};
use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// 지정 만료 시각의 서명 없는 테스트용 JWT 생성
pub fn test_jwt(exp: DateTime<Utc>) -> String {
    let engine = &base64::engine::general_purpose::URL_SAFE_NO_PAD;
    let header = engine.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = engine.encode(format!(r#"{{"sub":"test","exp":{}}}"#, exp.timestamp()));
    format!("{header}.{payload}.sig")
}

/// 전송 기록용 모의 연결
pub struct MockConnection {
    sent: Arc<Mutex<Vec<String>>>,
    closed: Arc<Mutex<Vec<(u16, String)>>>,
}

#[async_trait]
impl DuplexConnection for MockConnection {
    async fn send_text(&self, text: &str) -> Result<(), CoreError> {
        self.sent.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn close(&self, code: u16, reason: &str) -> Result<(), CoreError> {
        self.closed
            .lock()
            .unwrap()
            .push((code, reason.to_string()));
        Ok(())
    }
}

/// 연결 횟수/송신/종료/이벤트 채널을 기록하는 모의 커넥터
#[derive(Default)]
pub struct MockConnector {
    connects: AtomicUsize,
    fail_connect: AtomicBool,
    events: Mutex<Option<mpsc::Sender<TransportEvent>>>,
    sent: Arc<Mutex<Vec<String>>>,
    closed: Arc<Mutex<Vec<(u16, String)>>>,
}

impl MockConnector {
    /// 연결 시도 횟수
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// 다음 connect 호출의 실패 여부 설정
    pub fn set_fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// 지금까지 전송된 텍스트 프레임
    pub fn sent_messages(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    /// 지금까지의 close 호출 (코드, 사유)
    pub fn close_calls(&self) -> Vec<(u16, String)> {
        self.closed.lock().unwrap().clone()
    }

    /// close 기록 공유 핸들 (콜백 순서 검증용)
    pub fn close_log(&self) -> Arc<Mutex<Vec<(u16, String)>>> {
        self.closed.clone()
    }

    /// 인바운드 이벤트 주입 후 디스패치가 처리할 시간을 준다
    pub async fn inject(&self, event: TransportEvent) {
        let tx = self.events.lock().unwrap().clone().expect("연결 전 주입");
        tx.send(event).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

#[async_trait]
impl DuplexConnector for MockConnector {
    async fn connect(
        &self,
        _url: &str,
        _bearer_token: &str,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<Box<dyn DuplexConnection>, CoreError> {
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(CoreError::Transport("연결 거부".to_string()));
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        *self.events.lock().unwrap() = Some(events.clone());
        let _ = events.try_send(TransportEvent::Open);
        Ok(Box::new(MockConnection {
            sent: self.sent.clone(),
            closed: self.closed.clone(),
        }))
    }
}
