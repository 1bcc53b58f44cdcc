//! AEGIS 핵심 에러 타입.
//!
//! 모든 어댑터 crate는 자체 에러 대신 `CoreError`를 반환한다.
//! 인증 실패만이 백그라운드 루프를 중단시킬 수 있다 — 전송 실패는
//! 재연결로, 샘플 단위 전송 에러는 로그 후 무시로 처리된다.

use thiserror::Error;

/// 코어 레이어 에러.
/// 전송/인증/검증/노드 도달 불가를 구분한다.
#[derive(Debug, Error)]
pub enum CoreError {
    /// JSON 직렬화/역직렬화 실패
    #[error("직렬화 에러: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 설정값 오류
    #[error("설정 에러: {0}")]
    Config(String),

    /// 필드 유효성 검증 실패
    #[error("유효성 검증 실패: {field}: {message}")]
    Validation {
        /// 검증 실패한 필드명
        field: String,
        /// 실패 사유
        message: String,
    },

    /// 인증 실패 (리프레시 토큰 만료, 자격증명 오류 등) — 세션/루프에 치명적
    #[error("인증 에러: {0}")]
    Auth(String),

    /// 리소스를 찾을 수 없음
    #[error("{resource_type} 미발견: {id}")]
    NotFound {
        /// 리소스 종류 (예: "Customer")
        resource_type: String,
        /// 리소스 식별자
        id: String,
    },

    /// 네트워크 에러 (연결 실패, 타임아웃) — 재시도 가능
    #[error("네트워크 에러: {0}")]
    Network(String),

    /// 소켓 전송 에러 (연결/송신/수신 실패) — 재연결 대상
    #[error("전송 에러: {0}")]
    Transport(String),

    /// 자격증명 저장소 에러 (키링/프로필 파일)
    #[error("자격증명 저장소 에러: {0}")]
    CredentialStore(String),

    /// 컴패니언 노드 도달 불가 — 정상 상황, 호출측은 로그 후 무시
    #[error("컴패니언 노드 없음: {0}")]
    NodeUnreachable(String),

    /// Rate Limit 초과 (429)
    #[error("요청 한도 초과, {retry_after_secs}초 후 재시도")]
    RateLimit {
        /// 재시도 대기 시간 (초)
        retry_after_secs: u64,
    },

    /// 서비스 일시 불가 (503)
    #[error("서비스 일시 불가: {0}")]
    ServiceUnavailable(String),

    /// 내부 에러 (예상치 못한 상황)
    #[error("내부 에러: {0}")]
    Internal(String),

    /// I/O 에러
    #[error("I/O 에러: {0}")]
    Io(#[from] std::io::Error),
}
