//! 자격증명 저장소 포트.
//!
//! 구현: `aegis-storage` crate (OS 키링 + JSON 프로필 파일, 인메모리)

use crate::error::CoreError;
use crate::models::auth::TokenPair;
use crate::models::customer::Customer;

/// 프로세스 전역 자격증명 저장소.
///
/// 액세스 토큰과 프로필은 일반 저장, 리프레시 토큰은 보안 저장을
/// 사용한다. 쓰기는 last-writer-wins로 충분하지만, 토큰 쌍 저장은
/// 원자적이어야 한다 — 읽는 쪽이 절반만 쓰인 쌍을 관찰해서는 안 된다.
pub trait CredentialStore: Send + Sync {
    /// 현재 액세스 토큰
    fn access_token(&self) -> Option<String>;

    /// 액세스 토큰 저장
    fn save_access_token(&self, token: &str) -> Result<(), CoreError>;

    /// 장기 리프레시 토큰
    fn refresh_token(&self) -> Option<String>;

    /// 장기 리프레시 토큰 저장 (보안 저장소)
    fn save_refresh_token(&self, token: &str) -> Result<(), CoreError>;

    /// 토큰 쌍 원자적 저장
    fn save_pair(&self, pair: &TokenPair) -> Result<(), CoreError>;

    /// 저장된 고객 프로필
    fn user(&self) -> Option<Customer>;

    /// 고객 프로필 저장 (프로필에 포함된 토큰도 함께 갱신)
    fn save_user(&self, customer: &Customer) -> Result<(), CoreError>;

    /// 전체 삭제 (로그아웃)
    fn clear(&self) -> Result<(), CoreError>;
}
