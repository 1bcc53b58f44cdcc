//! 고객(사용자) 모델.
//!
//! 필드명은 백엔드 JSON 계약을 그대로 따른다 (snake_case 유지).

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// 로그인 자격증명
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub login: String,
    pub password: String,
}

/// 고객 프로필 — 백엔드가 반환하고 자격증명 저장소에 보존되는 형태
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: i64,
    pub login: String,
    /// 서버 응답에는 비어 있고, 등록 요청에서만 채워진다
    #[serde(default)]
    pub password: String,
    pub name: String,
    pub surname: String,
    pub phone: String,
    pub pesel: String,
    pub email: String,
    #[serde(default)]
    pub account_deleted: bool,
    /// 보호 서비스 만료 시각 (ISO local datetime, 서버 응답 그대로)
    #[serde(default)]
    pub protection_expiration_date: Option<String>,
    /// 현재 액세스 토큰 (서버가 프로필과 함께 내려줌)
    #[serde(default)]
    pub token: Option<String>,
}

impl Customer {
    /// 보호 기간이 아직 유효한지 확인.
    ///
    /// 만료 시각이 없거나 파싱 불가면 비활성으로 간주한다.
    pub fn is_protection_active(&self, now: NaiveDateTime) -> bool {
        match &self.protection_expiration_date {
            Some(raw) => match raw.parse::<NaiveDateTime>() {
                Ok(expiration) => now < expiration,
                Err(_) => false,
            },
            None => false,
        }
    }
}

/// 고객 정보 수정 요청 — None 필드는 변경하지 않는다
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustomerEdit {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub login: Option<String>,
    /// 본인 확인용 현재 비밀번호 (필수)
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub surname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pesel: Option<String>,
}
