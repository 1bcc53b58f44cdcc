//! 소켓 와이어 메시지.
//!
//! 디스패치 백엔드와 주고받는 JSON 형태. 아웃바운드 4종 + 인바운드는
//! 필드 존재 여부로 판별한다 (미지의 형태는 무시 — 전방 호환).

use serde::{Deserialize, Serialize};

use crate::models::location::LocationSample;

/// 취소 상태 문자열
pub const STATUS_CANCEL: &str = "cancel";

/// 정상 종료 close 코드
pub const CLOSE_NORMAL: u16 = 1000;
/// "신고 id를 동봉한 취소" close 코드 (애플리케이션 정의)
pub const CLOSE_CANCEL_WITH_REPORT: u16 = 4000;

/// 신고 시작 메시지 — 최초 SOS 트리거 시 1회 전송
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartupReport {
    pub call_report: bool,
    pub user_id: i64,
    pub latitude: f64,
    pub longitude: f64,
}

impl StartupReport {
    pub fn new(user_id: i64, sample: LocationSample) -> Self {
        Self {
            call_report: true,
            user_id,
            latitude: sample.latitude,
            longitude: sample.longitude,
        }
    }
}

/// 재연결 핑 — 재연결 대기 중 "신고를 재개해 달라"는 신호
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconnectPing {
    pub reconnect_message: bool,
    pub user_id: i64,
    pub latitude: f64,
    pub longitude: f64,
}

impl ReconnectPing {
    pub fn new(user_id: i64, sample: LocationSample) -> Self {
        Self {
            reconnect_message: true,
            user_id,
            latitude: sample.latitude,
            longitude: sample.longitude,
        }
    }
}

/// 주기 위치 보고 — 활성 신고 id로 태깅
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodicReport {
    pub report_id: i64,
    pub user_id: i64,
    pub latitude: f64,
    pub longitude: f64,
}

impl PeriodicReport {
    pub fn new(report_id: i64, user_id: i64, sample: LocationSample) -> Self {
        Self {
            report_id,
            user_id,
            latitude: sample.latitude,
            longitude: sample.longitude,
        }
    }
}

/// 취소 통지 — 루프 종료 시 best-effort 전송
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelNotice {
    pub report_id: i64,
    pub status: String,
}

impl CancelNotice {
    pub fn new(report_id: i64) -> Self {
        Self {
            report_id,
            status: STATUS_CANCEL.to_string(),
        }
    }
}

/// 인바운드 서버 메시지 — 필드 존재 여부로 의미 판별.
///
/// `reportId` 보유 → 신고 시작/재개. `status` 보유 → 생명주기 전이.
/// 둘 다 없으면 무시 대상.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    #[serde(default)]
    pub report_id: Option<i64>,
    #[serde(default)]
    pub status: Option<String>,
}

/// close 코드 4000의 사유 페이로드
pub fn cancel_close_reason(report_id: i64) -> String {
    serde_json::json!({ "reportId": report_id }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startup_report_shape() {
        let msg = StartupReport::new(12, LocationSample::new(52.1, 21.0));
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["callReport"], true);
        assert_eq!(json["userId"], 12);
        assert_eq!(json["latitude"], 52.1);
        assert_eq!(json["longitude"], 21.0);
    }

    #[test]
    fn reconnect_ping_shape() {
        let msg = ReconnectPing::new(12, LocationSample::new(50.0, 19.9));
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["reconnectMessage"], true);
        assert!(json.get("callReport").is_none());
    }

    #[test]
    fn periodic_report_shape() {
        let msg = PeriodicReport::new(42, 12, LocationSample::new(52.1, 21.0));
        let json = serde_json::to_string(&msg).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["reportId"], 42);
        assert_eq!(value["userId"], 12);
    }

    #[test]
    fn cancel_notice_shape() {
        let msg = CancelNotice::new(42);
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["reportId"], 42);
        assert_eq!(json["status"], "cancel");
    }

    #[test]
    fn inbound_by_field_presence() {
        let started: ServerMessage = serde_json::from_str(r#"{"reportId": 42}"#).unwrap();
        assert_eq!(started.report_id, Some(42));
        assert!(started.status.is_none());

        let status: ServerMessage = serde_json::from_str(r#"{"status": "finished"}"#).unwrap();
        assert_eq!(status.status.as_deref(), Some("finished"));

        // 미지의 형태는 빈 메시지로 파싱된다 (무시 대상)
        let unknown: ServerMessage = serde_json::from_str(r#"{"hello": 1}"#).unwrap();
        assert!(unknown.report_id.is_none() && unknown.status.is_none());
    }

    #[test]
    fn cancel_close_reason_payload() {
        assert_eq!(cancel_close_reason(42), r#"{"reportId":42}"#);
    }
}
