//! 애플리케이션 설정 구조체.
//!
//! 서버 주소, 소켓 재연결 지연, 위치 보고 주기, 토큰 갱신 임계값 등
//! 런타임 설정을 정의한다. `config_manager`를 통해 JSON 파일에서 로드.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 최상위 애플리케이션 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// 디스패치 서버 연결 설정
    pub server: ServerConfig,
    /// 소켓 세션 설정
    #[serde(default)]
    pub session: SessionConfig,
    /// 위치 보고 설정
    #[serde(default)]
    pub location: LocationConfig,
    /// 토큰 갱신 설정
    #[serde(default)]
    pub auth: AuthConfig,
    /// 연결 상태 폴링 설정
    #[serde(default)]
    pub connectivity: ConnectivityConfig,
}

/// 디스패치 서버 연결 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// REST 기본 URL (예: `https://localhost:8443`)
    pub base_url: String,
    /// 클라이언트 소켓 경로 (REST URL 기준 wss 경로)
    #[serde(default = "default_socket_path")]
    pub socket_path: String,
    /// HTTP 요청 타임아웃 (초)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_socket_path() -> String {
    "/clientSocket".to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

impl ServerConfig {
    /// REST URL에서 파생한 소켓 URL (`https://` → `wss://`)
    pub fn socket_url(&self) -> String {
        let base = self
            .base_url
            .trim_end_matches('/')
            .replace("http://", "ws://")
            .replace("https://", "wss://");
        format!("{}{}", base, self.socket_path)
    }
}

/// 소켓 세션 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// 비정상 종료 후 재연결 지연 (초)
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,
    /// Queued 전송 정책의 버퍼 상한
    #[serde(default = "default_send_queue_limit")]
    pub send_queue_limit: usize,
}

fn default_reconnect_delay_secs() -> u64 {
    5
}

fn default_send_queue_limit() -> usize {
    16
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_secs: default_reconnect_delay_secs(),
            send_queue_limit: default_send_queue_limit(),
        }
    }
}

impl SessionConfig {
    /// 재연결 지연을 Duration으로 반환
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }
}

/// 위치 보고 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationConfig {
    /// 위치 샘플 전송 주기 (초)
    #[serde(default = "default_update_interval_secs")]
    pub update_interval_secs: u64,
}

fn default_update_interval_secs() -> u64 {
    10
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            update_interval_secs: default_update_interval_secs(),
        }
    }
}

impl LocationConfig {
    /// 전송 주기를 Duration으로 반환
    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_secs)
    }
}

/// 토큰 갱신 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// 액세스 토큰 만료 임계값 (초).
    /// 만료까지 남은 시간이 이 값 이하이면 갱신을 수행한다.
    #[serde(default = "default_token_expiration_threshold_secs")]
    pub token_expiration_threshold_secs: u64,
}

fn default_token_expiration_threshold_secs() -> u64 {
    60
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_expiration_threshold_secs: default_token_expiration_threshold_secs(),
        }
    }
}

impl AuthConfig {
    /// 갱신 임계값을 Duration으로 반환
    pub fn expiration_threshold(&self) -> Duration {
        Duration::from_secs(self.token_expiration_threshold_secs)
    }

    /// 백그라운드 갱신 체크 주기: 임계값의 절반 (threshold × 500ms)
    pub fn refresh_check_interval(&self) -> Duration {
        Duration::from_millis(self.token_expiration_threshold_secs * 500)
    }

    /// 위치 루프에서 토큰 체크를 수행할 틱 간격.
    /// 갱신 체크 주기를 샘플 주기로 나눈 값 (최소 1).
    pub fn check_interval_count(&self, location: &LocationConfig) -> u64 {
        (self.token_expiration_threshold_secs * 500 / (location.update_interval_secs * 1000))
            .max(1)
    }
}

/// 연결 상태 폴링 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectivityConfig {
    /// 도달 가능 상태에서의 폴링 주기 (초)
    #[serde(default = "default_poll_online_secs")]
    pub poll_online_secs: u64,
    /// 도달 불가 상태에서의 폴링 주기 (초)
    #[serde(default = "default_poll_offline_secs")]
    pub poll_offline_secs: u64,
    /// 오프라인 전환 임계값 (연속 실패 횟수)
    #[serde(default = "default_offline_threshold")]
    pub offline_threshold: u64,
}

fn default_poll_online_secs() -> u64 {
    15
}

fn default_poll_offline_secs() -> u64 {
    5
}

fn default_offline_threshold() -> u64 {
    3
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            poll_online_secs: default_poll_online_secs(),
            poll_offline_secs: default_poll_offline_secs(),
            offline_threshold: default_offline_threshold(),
        }
    }
}

impl AppConfig {
    /// 기본 설정 생성
    pub fn default_config() -> Self {
        Self {
            server: ServerConfig {
                base_url: "https://localhost:8443".to_string(),
                socket_path: default_socket_path(),
                request_timeout_secs: default_request_timeout_secs(),
            },
            session: SessionConfig::default(),
            location: LocationConfig::default(),
            auth: AuthConfig::default(),
            connectivity: ConnectivityConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = AppConfig::default_config();
        assert_eq!(config.session.reconnect_delay_secs, 5);
        assert_eq!(config.location.update_interval_secs, 10);
        assert_eq!(config.auth.token_expiration_threshold_secs, 60);
        assert_eq!(config.connectivity.poll_online_secs, 15);
        assert_eq!(config.connectivity.poll_offline_secs, 5);
    }

    #[test]
    fn socket_url_derivation() {
        let server = ServerConfig {
            base_url: "https://10.0.2.2:8443/".to_string(),
            socket_path: "/clientSocket".to_string(),
            request_timeout_secs: 10,
        };
        assert_eq!(server.socket_url(), "wss://10.0.2.2:8443/clientSocket");
    }

    #[test]
    fn token_check_tick_count() {
        // 임계값 60초 × 500ms = 30초 주기, 샘플 10초 → 3틱마다 체크
        let auth = AuthConfig::default();
        let location = LocationConfig::default();
        assert_eq!(auth.check_interval_count(&location), 3);
    }

    #[test]
    fn config_serde_roundtrip() {
        let config = AppConfig::default_config();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: AppConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.server.socket_path, "/clientSocket");
        assert_eq!(parsed.session.send_queue_limit, 16);
    }
}
