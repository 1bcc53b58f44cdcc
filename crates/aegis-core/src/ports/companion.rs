//! 컴패니언(워치) 메시징 전송 포트.
//!
//! 구현: `aegis-wear` crate (인프로세스 전송; 플랫폼 메시징 연동점).
//! 연결된 노드가 없는 것은 정상 상황이다 (워치 미페어링/범위 밖).

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::CoreError;
use crate::models::wear::CompanionMessage;

/// 포인트 투 포인트 컴패니언 메시징 전송
#[async_trait]
pub trait CompanionTransport: Send + Sync {
    /// 현재 연결된 컴패니언 노드 id 목록
    async fn connected_nodes(&self) -> Result<Vec<String>, CoreError>;

    /// 지정 노드로 메시지 전송
    async fn send_message(
        &self,
        node_id: &str,
        path: &str,
        payload: &[u8],
    ) -> Result<(), CoreError>;

    /// 인바운드 메시지 수신 시작.
    ///
    /// 수신된 요청을 `tx` 채널로 전달한다.
    async fn listen(&self, tx: mpsc::Sender<CompanionMessage>) -> Result<(), CoreError>;
}
