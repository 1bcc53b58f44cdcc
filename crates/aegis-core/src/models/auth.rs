//! 토큰 모델.

use serde::{Deserialize, Serialize};

/// 액세스/리프레시 토큰 쌍.
///
/// 액세스 토큰은 모든 아웃바운드 요청과 소켓 연결에 Bearer 자격으로
/// 붙는다. 리프레시 토큰은 자체 만료를 가지며, 만료되면 어떤 인증
/// 동작도 진행할 수 없다 (재로그인 필요).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    /// 단기 액세스 토큰 (JWT)
    pub access: String,
    /// 장기 리프레시 토큰 (JWT)
    pub refresh: String,
}
