//! JWT 토큰 게이트키퍼.
//!
//! 액세스/리프레시 토큰 상태를 판정하고, 필요할 때만 갱신 호출을
//! 수행한다. 리프레시 토큰이 만료되었으면 어떤 인증 동작도 진행할 수
//! 없다 — 호출측은 재로그인으로 라우팅해야 한다.
//! 갱신 실패는 예외가 아니라 `None`으로 보고된다. 백그라운드 루프는
//! `None`을 받으면 무한 재시도 대신 루프를 중단하고 미인증 상태를
//! 드러내야 한다.

use aegis_core::error::CoreError;
use aegis_core::models::auth::TokenPair;
use aegis_core::ports::credential_store::CredentialStore;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// 갱신 응답 — 새 액세스 토큰 + 선택적 리프레시 토큰 회전
#[derive(Debug, Deserialize)]
struct RefreshResponse {
    token: String,
    #[serde(default, rename = "refreshToken")]
    refresh_token: Option<String>,
}

/// JWT 페이로드에서 `exp` 클레임을 디코딩한다 (서명 검증 없음 —
/// 클라이언트는 만료 판정에만 사용한다).
pub fn decode_expiry(token: &str) -> Option<DateTime<Utc>> {
    let payload = token.split('.').nth(1)?;
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload)
        .ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    let exp = claims.get("exp")?.as_i64()?;
    DateTime::<Utc>::from_timestamp(exp, 0)
}

/// 토큰 게이트키퍼 — 만료 판정 + 임계값 기반 갱신
pub struct TokenGatekeeper {
    base_url: String,
    client: reqwest::Client,
    store: Arc<dyn CredentialStore>,
    /// 만료까지 남은 시간이 이 값 이하이면 갱신
    expiration_threshold: Duration,
    /// 동시 갱신 직렬화 — 중복 네트워크 호출과 쌍 오염 방지
    refresh_lock: Mutex<()>,
}

impl TokenGatekeeper {
    /// 새 게이트키퍼 생성
    pub fn new(
        base_url: &str,
        store: Arc<dyn CredentialStore>,
        expiration_threshold: std::time::Duration,
    ) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            store,
            expiration_threshold: Duration::seconds(expiration_threshold.as_secs() as i64),
            refresh_lock: Mutex::new(()),
        }
    }

    /// 리프레시 토큰 만료 여부 — 네트워크 호출 없는 순수 판정.
    ///
    /// 토큰이 없거나 디코딩 불가인 경우도 만료로 간주한다.
    pub fn is_refresh_expired(&self) -> bool {
        match self.store.refresh_token() {
            Some(token) => match decode_expiry(&token) {
                Some(expiry) => Utc::now() >= expiry,
                None => true,
            },
            None => true,
        }
    }

    /// 인증 동작 선행 조건 검사.
    ///
    /// 리프레시 토큰이 만료되었으면 네트워크 호출 없이 즉시 실패한다.
    pub fn ensure_authorized(&self) -> Result<(), CoreError> {
        if self.is_refresh_expired() {
            return Err(CoreError::Auth(
                "리프레시 토큰 만료 — 재로그인 필요".to_string(),
            ));
        }
        Ok(())
    }

    /// 액세스 토큰이 갱신 임계값 안에 들어왔는지
    fn needs_refresh(&self) -> bool {
        match self.store.access_token() {
            Some(token) => match decode_expiry(&token) {
                Some(expiry) => Utc::now() + self.expiration_threshold >= expiry,
                None => true,
            },
            None => true,
        }
    }

    /// 필요 시 토큰 갱신.
    ///
    /// 액세스 토큰이 임계값 밖이면 현재 쌍을 그대로 반환한다.
    /// 갱신 성공 시 새 쌍을 저장소에 보존하고 반환한다 (리프레시 토큰
    /// 회전 포함). 실패는 `None` — 호출측은 미인증으로 취급해야 하며
    /// 조용히 진행해서는 안 된다.
    pub async fn refresh_if_needed(&self) -> Option<TokenPair> {
        let _guard = self.refresh_lock.lock().await;

        // 락 획득 사이에 다른 호출이 이미 갱신했을 수 있다
        if !self.needs_refresh() {
            let access = self.store.access_token()?;
            let refresh = self.store.refresh_token()?;
            return Some(TokenPair { access, refresh });
        }

        let refresh = match self.store.refresh_token() {
            Some(token) => token,
            None => {
                warn!("리프레시 토큰 없음 — 갱신 불가");
                return None;
            }
        };
        if self.is_refresh_expired() {
            warn!("리프레시 토큰 만료 — 갱신 불가");
            return None;
        }

        let url = format!("{}/auth/client/refresh", self.base_url);
        let body = serde_json::json!({ "refreshToken": refresh });

        let resp = match self.client.post(&url).json(&body).send().await {
            Ok(resp) => resp,
            Err(e) => {
                warn!("토큰 갱신 요청 실패: {e}");
                return None;
            }
        };

        if !resp.status().is_success() {
            warn!("토큰 갱신 거부 ({})", resp.status());
            return None;
        }

        let refreshed: RefreshResponse = match resp.json().await {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("갱신 응답 파싱 실패: {e}");
                return None;
            }
        };

        let pair = TokenPair {
            access: refreshed.token,
            refresh: refreshed.refresh_token.unwrap_or(refresh),
        };
        if let Err(e) = self.store.save_pair(&pair) {
            warn!("갱신 토큰 저장 실패: {e}");
            return None;
        }

        debug!("토큰 갱신 완료");
        Some(pair)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_storage::MemoryCredentialStore;
    use std::time::Duration as StdDuration;

    /// 지정 만료 시각의 서명 없는 테스트용 JWT 생성
    fn test_jwt(exp: DateTime<Utc>) -> String {
        let engine = &base64::engine::general_purpose::URL_SAFE_NO_PAD;
        let header = engine.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = engine.encode(format!(r#"{{"sub":"7","exp":{}}}"#, exp.timestamp()));
        format!("{header}.{payload}.sig")
    }

    fn gatekeeper_with(
        base_url: &str,
        access_exp: Option<DateTime<Utc>>,
        refresh_exp: Option<DateTime<Utc>>,
    ) -> (TokenGatekeeper, Arc<MemoryCredentialStore>) {
        let store = Arc::new(MemoryCredentialStore::new());
        if let Some(exp) = access_exp {
            store.save_access_token(&test_jwt(exp)).unwrap();
        }
        if let Some(exp) = refresh_exp {
            store.save_refresh_token(&test_jwt(exp)).unwrap();
        }
        let gatekeeper = TokenGatekeeper::new(
            base_url,
            store.clone() as Arc<dyn CredentialStore>,
            StdDuration::from_secs(60),
        );
        (gatekeeper, store)
    }

    #[test]
    fn decode_expiry_reads_exp_claim() {
        let exp = Utc::now() + Duration::hours(1);
        let decoded = decode_expiry(&test_jwt(exp)).unwrap();
        assert_eq!(decoded.timestamp(), exp.timestamp());
    }

    #[test]
    fn decode_expiry_rejects_garbage() {
        assert!(decode_expiry("not-a-jwt").is_none());
        assert!(decode_expiry("a.b.c").is_none());
    }

    #[test]
    fn refresh_expired_without_token() {
        let (gatekeeper, _) = gatekeeper_with("http://localhost:1", None, None);
        assert!(gatekeeper.is_refresh_expired());
        assert!(gatekeeper.ensure_authorized().is_err());
    }

    #[test]
    fn refresh_not_expired_with_future_token() {
        let (gatekeeper, _) = gatekeeper_with(
            "http://localhost:1",
            None,
            Some(Utc::now() + Duration::days(7)),
        );
        assert!(!gatekeeper.is_refresh_expired());
        assert!(gatekeeper.ensure_authorized().is_ok());
    }

    #[tokio::test]
    async fn fresh_access_token_skips_network() {
        // 액세스 토큰이 임계값 밖이면 서버를 호출하지 않는다
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/auth/client/refresh")
            .expect(0)
            .create_async()
            .await;

        let (gatekeeper, _) = gatekeeper_with(
            &server.url(),
            Some(Utc::now() + Duration::hours(1)),
            Some(Utc::now() + Duration::days(7)),
        );

        let pair = gatekeeper.refresh_if_needed().await;
        assert!(pair.is_some());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn near_expiry_triggers_refresh_and_persists() {
        let mut server = mockito::Server::new_async().await;
        let rotated = test_jwt(Utc::now() + Duration::days(14));
        let new_access = test_jwt(Utc::now() + Duration::hours(1));
        let mock = server
            .mock("POST", "/auth/client/refresh")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(format!(
                r#"{{"token":"{new_access}","refreshToken":"{rotated}"}}"#
            ))
            .create_async()
            .await;

        let (gatekeeper, store) = gatekeeper_with(
            &server.url(),
            Some(Utc::now() + Duration::seconds(10)),
            Some(Utc::now() + Duration::days(7)),
        );

        let pair = gatekeeper.refresh_if_needed().await.unwrap();
        assert_eq!(pair.access, new_access);
        assert_eq!(pair.refresh, rotated);
        // 회전된 쌍이 저장소에 보존된다
        assert_eq!(store.access_token().as_deref(), Some(new_access.as_str()));
        assert_eq!(store.refresh_token().as_deref(), Some(rotated.as_str()));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn refresh_failure_reported_as_none() {
        // 도달 불가 서버 → None (예외 아님)
        let (gatekeeper, _) = gatekeeper_with(
            "http://127.0.0.1:1",
            Some(Utc::now() + Duration::seconds(10)),
            Some(Utc::now() + Duration::days(7)),
        );
        assert!(gatekeeper.refresh_if_needed().await.is_none());
    }

    #[tokio::test]
    async fn expired_refresh_token_never_calls_server() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/auth/client/refresh")
            .expect(0)
            .create_async()
            .await;

        let (gatekeeper, _) = gatekeeper_with(
            &server.url(),
            Some(Utc::now() - Duration::seconds(10)),
            Some(Utc::now() - Duration::days(1)),
        );

        assert!(gatekeeper.refresh_if_needed().await.is_none());
        mock.assert_async().await;
    }
}
