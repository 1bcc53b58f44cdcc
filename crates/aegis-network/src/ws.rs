//! WebSocket 전송 어댑터.
//!
//! `DuplexConnector`/`DuplexConnection` 포트 구현 (tokio-tungstenite).
//! 핸드셰이크에 Bearer 토큰을 붙이고, 수신 프레임을 `TransportEvent`로
//! 변환해 연결 시점에 받은 채널로 전달한다.

use aegis_core::error::CoreError;
use aegis_core::ports::transport::{DuplexConnection, DuplexConnector, TransportEvent};
use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket 연결 생성기 — `DuplexConnector` 포트 구현
#[derive(Debug, Default)]
pub struct WsConnector;

impl WsConnector {
    /// 새 연결 생성기
    pub fn new() -> Self {
        Self
    }

    /// 수신 루프 — 프레임을 TransportEvent로 변환해 전달
    async fn read_loop(mut read: SplitStream<WsStream>, tx: mpsc::Sender<TransportEvent>) {
        while let Some(msg) = read.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    if tx
                        .send(TransportEvent::Text(text.to_string()))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Ok(Message::Close(frame)) => {
                    let code = frame.map(|f| u16::from(f.code));
                    let _ = tx.send(TransportEvent::Closed { code }).await;
                    break;
                }
                Ok(_) => {} // Ping/Pong/Binary는 사용하지 않는다
                Err(e) => {
                    warn!("소켓 수신 에러: {e}");
                    let _ = tx.send(TransportEvent::Failure(e.to_string())).await;
                    break;
                }
            }
        }
        debug!("소켓 수신 루프 종료");
    }
}

#[async_trait]
impl DuplexConnector for WsConnector {
    async fn connect(
        &self,
        url: &str,
        bearer_token: &str,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<Box<dyn DuplexConnection>, CoreError> {
        let mut request = url
            .into_client_request()
            .map_err(|e| CoreError::Transport(format!("소켓 URL 파싱 실패: {e}")))?;
        let header = HeaderValue::from_str(&format!("Bearer {bearer_token}"))
            .map_err(|e| CoreError::Transport(format!("인증 헤더 구성 실패: {e}")))?;
        request.headers_mut().insert(AUTHORIZATION, header);

        debug!("소켓 연결: {url}");

        let (ws_stream, _) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| CoreError::Transport(format!("소켓 연결 실패: {e}")))?;

        let (write, read) = ws_stream.split();

        let _ = events.send(TransportEvent::Open).await;
        tokio::spawn(Self::read_loop(read, events));

        Ok(Box::new(WsConnection {
            write: Arc::new(tokio::sync::Mutex::new(write)),
        }))
    }
}

/// 수립된 WebSocket 연결 — `DuplexConnection` 포트 구현
pub struct WsConnection {
    write: Arc<tokio::sync::Mutex<SplitSink<WsStream, Message>>>,
}

#[async_trait]
impl DuplexConnection for WsConnection {
    async fn send_text(&self, text: &str) -> Result<(), CoreError> {
        let mut write = self.write.lock().await;
        write
            .send(Message::Text(text.to_string().into()))
            .await
            .map_err(|e| CoreError::Transport(format!("소켓 전송 실패: {e}")))
    }

    async fn close(&self, code: u16, reason: &str) -> Result<(), CoreError> {
        let mut write = self.write.lock().await;
        write
            .send(Message::Close(Some(CloseFrame {
                code: CloseCode::from(code),
                reason: reason.to_string().into(),
            })))
            .await
            .map_err(|e| CoreError::Transport(format!("소켓 종료 실패: {e}")))
    }
}
