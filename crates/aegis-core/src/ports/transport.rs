//! 듀플렉스 소켓 전송 포트.
//!
//! 구현: `aegis-network` crate (tokio-tungstenite).
//! 인바운드 이벤트는 연결 시점에 넘긴 `mpsc::Sender`로 전달된다.
//! 이벤트는 도착 순서대로 단일 소비자가 처리한다.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::CoreError;

/// 전송 계층에서 올라오는 이벤트
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// 핸드셰이크 완료, 연결 수립
    Open,
    /// 텍스트 프레임 수신
    Text(String),
    /// 연결 종료 (상대측 close 또는 로컬 close 완료)
    Closed {
        /// 상대가 보낸 close 코드 (없을 수 있음)
        code: Option<u16>,
    },
    /// 전송 실패 (연결/송수신 에러)
    Failure(String),
}

/// 듀플렉스 연결 생성기
#[async_trait]
pub trait DuplexConnector: Send + Sync {
    /// Bearer 토큰을 붙여 연결을 수립한다.
    ///
    /// 수신 이벤트는 `events`로 전달된다. 반환된 연결 핸들이 드롭되어도
    /// 수신 태스크는 Closed/Failure 이벤트를 끝으로 스스로 종료한다.
    async fn connect(
        &self,
        url: &str,
        bearer_token: &str,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<Box<dyn DuplexConnection>, CoreError>;
}

/// 수립된 듀플렉스 연결
#[async_trait]
pub trait DuplexConnection: Send + Sync {
    /// 텍스트 프레임 전송
    async fn send_text(&self, text: &str) -> Result<(), CoreError>;

    /// 지정한 코드/사유로 연결 종료
    async fn close(&self, code: u16, reason: &str) -> Result<(), CoreError>;
}
