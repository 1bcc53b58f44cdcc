//! 인프로세스 컴패니언 전송.
//!
//! `CompanionTransport` 포트의 채널 기반 구현. 플랫폼 메시징 계층이
//! 없는 환경(개발/테스트/데모)에서 워치 측을 흉내낸다.

use aegis_core::error::CoreError;
use aegis_core::models::wear::CompanionMessage;
use aegis_core::ports::companion::CompanionTransport;
use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

/// 기본 노드 id
const LOCAL_NODE_ID: &str = "local-node";

/// 채널 기반 컴패니언 전송
pub struct InProcessCompanionTransport {
    /// 현재 "연결된" 노드 목록 (빈 목록 = 워치 없음)
    nodes: RwLock<Vec<String>>,
    /// 워치행 메시지
    to_companion: mpsc::Sender<CompanionMessage>,
    /// 워치발 메시지 (listen이 1회 소유권을 가져간다)
    from_companion: Mutex<Option<mpsc::Receiver<CompanionMessage>>>,
}

impl InProcessCompanionTransport {
    /// 전송 + 워치 측 핸들(수신기, 송신기) 생성
    pub fn new() -> (
        std::sync::Arc<Self>,
        mpsc::Receiver<CompanionMessage>,
        mpsc::Sender<CompanionMessage>,
    ) {
        let (to_tx, to_rx) = mpsc::channel(16);
        let (from_tx, from_rx) = mpsc::channel(16);
        let transport = std::sync::Arc::new(Self {
            nodes: RwLock::new(vec![LOCAL_NODE_ID.to_string()]),
            to_companion: to_tx,
            from_companion: Mutex::new(Some(from_rx)),
        });
        (transport, to_rx, from_tx)
    }

    /// 연결된 노드 목록 교체 (빈 목록 = 워치 이탈 시뮬레이션)
    pub fn set_nodes(&self, nodes: Vec<String>) {
        *self.nodes.write() = nodes;
    }
}

#[async_trait]
impl CompanionTransport for InProcessCompanionTransport {
    async fn connected_nodes(&self) -> Result<Vec<String>, CoreError> {
        Ok(self.nodes.read().clone())
    }

    async fn send_message(
        &self,
        node_id: &str,
        path: &str,
        payload: &[u8],
    ) -> Result<(), CoreError> {
        if !self.nodes.read().iter().any(|n| n == node_id) {
            return Err(CoreError::NodeUnreachable(node_id.to_string()));
        }
        self.to_companion
            .send(CompanionMessage::new(path, payload.to_vec()))
            .await
            .map_err(|_| CoreError::NodeUnreachable(node_id.to_string()))
    }

    async fn listen(&self, tx: mpsc::Sender<CompanionMessage>) -> Result<(), CoreError> {
        let mut rx = self
            .from_companion
            .lock()
            .await
            .take()
            .ok_or_else(|| CoreError::Internal("이미 수신 중".to_string()))?;

        while let Some(message) = rx.recv().await {
            if tx.send(message).await.is_err() {
                break;
            }
        }
        debug!("컴패니언 수신 종료");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_core::models::wear::paths;

    #[tokio::test]
    async fn send_reaches_companion_side() {
        let (transport, mut to_rx, _from_tx) = InProcessCompanionTransport::new();

        transport
            .send_message(LOCAL_NODE_ID, paths::TOKEN_STATUS, b"valid")
            .await
            .unwrap();

        let received = to_rx.recv().await.unwrap();
        assert_eq!(received.path, paths::TOKEN_STATUS);
        assert_eq!(received.payload_text(), "valid");
    }

    #[tokio::test]
    async fn send_to_unknown_node_fails() {
        let (transport, _to_rx, _from_tx) = InProcessCompanionTransport::new();
        transport.set_nodes(Vec::new());

        let result = transport
            .send_message(LOCAL_NODE_ID, paths::TOKEN_STATUS, b"valid")
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn listen_forwards_inbound_messages() {
        let (transport, _to_rx, from_tx) = InProcessCompanionTransport::new();
        let (tx, mut rx) = mpsc::channel(4);

        let listen_transport = transport.clone();
        tokio::spawn(async move {
            let _ = listen_transport.listen(tx).await;
        });

        from_tx
            .send(CompanionMessage::new(paths::CHECK_TOKEN, Vec::new()))
            .await
            .unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.path, paths::CHECK_TOKEN);
    }
}
