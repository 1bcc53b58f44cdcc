//! 세션 연결 상태 모델.

use serde::{Deserialize, Serialize};

/// 디스패치 서버와의 연결 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionStatus {
    /// 연결됨
    Connected,
    /// 연결 끊김
    Disconnected,
    /// 재연결 대기/시도 중
    Reconnecting,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionStatus::Connected => write!(f, "Connected"),
            ConnectionStatus::Disconnected => write!(f, "Disconnected"),
            ConnectionStatus::Reconnecting => write!(f, "Reconnecting"),
        }
    }
}
