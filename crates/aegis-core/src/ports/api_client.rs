//! REST API 클라이언트 포트.
//!
//! 구현: `aegis-network` crate (reqwest)

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::CoreError;
use crate::models::customer::{Credentials, Customer, CustomerEdit};

/// 로그인/등록/토큰검증 응답
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    /// 고객 프로필
    pub customer: Customer,
    /// 새 액세스 토큰
    pub token: String,
    /// 장기 리프레시 토큰 (checkToken 응답에는 없을 수 있음)
    #[serde(default, rename = "refreshToken")]
    pub refresh_token: Option<String>,
}

/// 사용자 REST API.
///
/// 인증이 필요한 호출은 리프레시 토큰이 만료된 경우 네트워크 호출
/// 없이 즉시 `CoreError::Auth`로 실패해야 한다.
#[async_trait]
pub trait UserApi: Send + Sync {
    /// 로그인 — 성공 시 프로필/토큰 쌍이 자격증명 저장소에 보존된다
    async fn login(&self, credentials: &Credentials) -> Result<Customer, CoreError>;

    /// 신규 고객 등록
    async fn register(&self, customer: &Customer) -> Result<Customer, CoreError>;

    /// 고객 정보 수정
    async fn edit_customer(&self, id: i64, edit: &CustomerEdit) -> Result<Customer, CoreError>;

    /// 저장된 액세스 토큰 검증 및 프로필 복원
    async fn check_token(&self, token: &str) -> Result<Customer, CoreError>;

    /// 로그아웃 (서버 세션 무효화)
    async fn logout(&self) -> Result<(), CoreError>;

    /// 비밀번호 재설정 메일 요청
    async fn remind_password(&self, email: &str) -> Result<(), CoreError>;

    /// 서버 도달 가능성 확인 (빈 호출)
    async fn ping(&self) -> Result<(), CoreError>;
}
