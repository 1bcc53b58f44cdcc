//! HTTP REST API 클라이언트.
//!
//! `UserApi` 포트 구현. 상태 코드별 에러 매핑 + 재시도 로직.
//! 인증이 필요한 호출은 게이트키퍼 선행 검사를 통과해야 하며,
//! 리프레시 토큰이 만료된 경우 네트워크 호출 없이 즉시 실패한다.

use aegis_core::error::CoreError;
use aegis_core::models::customer::{Credentials, Customer, CustomerEdit};
use aegis_core::ports::api_client::{AuthResponse, UserApi};
use aegis_core::ports::credential_store::CredentialStore;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::auth::TokenGatekeeper;

/// 기본 재시도 횟수
const DEFAULT_MAX_RETRIES: u32 = 3;

/// 재시도 가능한 에러인지 판별 — 인증/검증 실패는 재시도하지 않는다
fn is_retryable(error: &CoreError) -> bool {
    matches!(
        error,
        CoreError::Network(_) | CoreError::ServiceUnavailable(_) | CoreError::RateLimit { .. }
    )
}

/// REST API 클라이언트 — `UserApi` 포트 구현
pub struct HttpApiClient {
    client: reqwest::Client,
    base_url: String,
    store: Arc<dyn CredentialStore>,
    gatekeeper: Arc<TokenGatekeeper>,
    max_retries: u32,
}

impl HttpApiClient {
    /// 새 HTTP API 클라이언트 생성
    pub fn new(
        base_url: &str,
        store: Arc<dyn CredentialStore>,
        gatekeeper: Arc<TokenGatekeeper>,
        timeout: Duration,
    ) -> Result<Self, CoreError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CoreError::Network(format!("HTTP 클라이언트 빌드 실패: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            store,
            gatekeeper,
            max_retries: DEFAULT_MAX_RETRIES,
        })
    }

    /// 재시도 횟수 설정
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Authorization 헤더가 포함된 요청 빌더 반환
    fn authorized_request(
        &self,
        method: reqwest::Method,
        path: &str,
    ) -> Result<reqwest::RequestBuilder, CoreError> {
        let token = self
            .store
            .access_token()
            .ok_or_else(|| CoreError::Auth("인증되지 않음".to_string()))?;
        let url = format!("{}{}", self.base_url, path);
        Ok(self.client.request(method, &url).bearer_auth(token))
    }

    /// 응답 상태 코드 확인 및 에러 매핑
    async fn check_response(
        &self,
        resp: reqwest::Response,
    ) -> Result<reqwest::Response, CoreError> {
        let status = resp.status();

        if status.is_success() {
            return Ok(resp);
        }

        let status_code = status.as_u16();
        let text = resp.text().await.unwrap_or_else(|e| {
            warn!("응답 본문 읽기 실패: {e}");
            String::new()
        });

        match status_code {
            400 => Err(CoreError::Validation {
                field: "request".to_string(),
                message: text,
            }),
            401 | 403 => Err(CoreError::Auth(format!("인증 실패 ({status_code}): {text}"))),
            404 => Err(CoreError::NotFound {
                resource_type: "Customer".to_string(),
                id: text,
            }),
            429 => Err(CoreError::RateLimit {
                retry_after_secs: 60,
            }),
            503 => Err(CoreError::ServiceUnavailable(text)),
            _ => Err(CoreError::Internal(format!("API 에러 ({status}): {text}"))),
        }
    }

    /// 재시도가 포함된 요청 실행
    ///
    /// exponential backoff: 1s → 2s → 4s
    async fn execute_with_retry<F, Fut, T>(&self, operation: F) -> Result<T, CoreError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, CoreError>>,
    {
        let mut last_error = CoreError::Internal("요청 실패".to_string());
        let mut delay = Duration::from_secs(1);

        for attempt in 0..=self.max_retries {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    if !is_retryable(&e) || attempt == self.max_retries {
                        return Err(e);
                    }

                    warn!(
                        "요청 실패 (시도 {}/{}): {e}, {delay:?} 후 재시도",
                        attempt + 1,
                        self.max_retries + 1
                    );

                    if let CoreError::RateLimit { retry_after_secs } = &e {
                        delay = Duration::from_secs(*retry_after_secs);
                    }

                    last_error = e;
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(Duration::from_secs(30));
                }
            }
        }

        Err(last_error)
    }

    /// 인증 응답을 저장소에 반영하고 프로필을 반환
    fn persist_auth(&self, resp: AuthResponse) -> Result<Customer, CoreError> {
        let mut customer = resp.customer;
        customer.token = Some(resp.token);
        self.store.save_user(&customer)?;
        if let Some(refresh) = resp.refresh_token {
            self.store.save_refresh_token(&refresh)?;
        }
        Ok(customer)
    }
}

#[async_trait]
impl UserApi for HttpApiClient {
    async fn login(&self, credentials: &Credentials) -> Result<Customer, CoreError> {
        debug!("로그인 요청: {}", credentials.login);

        let resp = self
            .execute_with_retry(|| async {
                let url = format!("{}/auth/client/login", self.base_url);
                let resp = self
                    .client
                    .post(&url)
                    .json(credentials)
                    .send()
                    .await
                    .map_err(|e| CoreError::Network(format!("로그인 요청 실패: {e}")))?;

                let resp = self.check_response(resp).await?;
                resp.json::<AuthResponse>()
                    .await
                    .map_err(|e| CoreError::Internal(format!("로그인 응답 파싱 실패: {e}")))
            })
            .await?;

        self.persist_auth(resp)
    }

    async fn register(&self, customer: &Customer) -> Result<Customer, CoreError> {
        debug!("등록 요청: {}", customer.login);

        let resp = self
            .execute_with_retry(|| async {
                let url = format!("{}/auth/client/register", self.base_url);
                let resp = self
                    .client
                    .post(&url)
                    .json(customer)
                    .send()
                    .await
                    .map_err(|e| CoreError::Network(format!("등록 요청 실패: {e}")))?;

                let resp = self.check_response(resp).await?;
                resp.json::<AuthResponse>()
                    .await
                    .map_err(|e| CoreError::Internal(format!("등록 응답 파싱 실패: {e}")))
            })
            .await?;

        self.persist_auth(resp)
    }

    async fn edit_customer(&self, id: i64, edit: &CustomerEdit) -> Result<Customer, CoreError> {
        // 리프레시 토큰 만료 시 네트워크 호출 없이 즉시 실패
        self.gatekeeper.ensure_authorized()?;

        let resp = self
            .execute_with_retry(|| async {
                let req = self.authorized_request(reqwest::Method::PUT, &format!("/client/{id}"))?;
                let resp = req
                    .json(edit)
                    .send()
                    .await
                    .map_err(|e| CoreError::Network(format!("고객 수정 요청 실패: {e}")))?;

                let resp = self.check_response(resp).await?;
                resp.json::<AuthResponse>()
                    .await
                    .map_err(|e| CoreError::Internal(format!("수정 응답 파싱 실패: {e}")))
            })
            .await?;

        self.persist_auth(resp)
    }

    async fn check_token(&self, token: &str) -> Result<Customer, CoreError> {
        let resp = self
            .execute_with_retry(|| async {
                let url = format!("{}/auth/client/checkToken", self.base_url);
                let resp = self
                    .client
                    .post(&url)
                    .bearer_auth(token)
                    .send()
                    .await
                    .map_err(|e| CoreError::Network(format!("토큰 검증 요청 실패: {e}")))?;

                let resp = self.check_response(resp).await?;
                resp.json::<AuthResponse>()
                    .await
                    .map_err(|e| CoreError::Internal(format!("검증 응답 파싱 실패: {e}")))
            })
            .await?;

        self.persist_auth(resp)
    }

    async fn logout(&self) -> Result<(), CoreError> {
        let url = format!("{}/auth/client/logout", self.base_url);
        if let Some(token) = self.store.access_token() {
            // 서버 세션 무효화는 best-effort — 실패해도 로컬은 비운다
            if let Err(e) = self.client.post(&url).bearer_auth(token).send().await {
                warn!("로그아웃 요청 실패: {e}");
            }
        }
        self.store.clear()?;
        debug!("로그아웃 완료");
        Ok(())
    }

    async fn remind_password(&self, email: &str) -> Result<(), CoreError> {
        let url = format!("{}/auth/client/remindPassword", self.base_url);
        let body = serde_json::json!({ "email": email });
        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::Network(format!("비밀번호 재설정 요청 실패: {e}")))?;

        self.check_response(resp).await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), CoreError> {
        // 재시도 없는 빈 호출 — 도달 가능성 폴링 전용
        let url = format!("{}/client/ping", self.base_url);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| CoreError::Network(format!("핑 실패: {e}")))?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(CoreError::Network(format!("핑 응답 에러: {}", resp.status())))
        }
    }
}
