//! 신고(SOS 알람) 생명주기 상태 머신.
//!
//! NONE → WAITING → CONFIRMED → NONE. CONFIRMED는 WAITING을 거쳐서만
//! 도달 가능하다. "finished"/취소/인증 만료는 어느 상태에서든 NONE으로
//! 되돌린다. WAITING/CONFIRMED는 활성 신고 id가 있을 때만 의미를 가진다.

use serde::{Deserialize, Serialize};

/// 현재 활성 알람의 생명주기 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportState {
    /// 활성 신고 없음
    None,
    /// 신고 접수됨, 디스패처 확인 대기
    Waiting,
    /// 디스패처가 확인함
    Confirmed,
}

impl Default for ReportState {
    fn default() -> Self {
        ReportState::None
    }
}

impl std::fmt::Display for ReportState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportState::None => write!(f, "NONE"),
            ReportState::Waiting => write!(f, "WAITING"),
            ReportState::Confirmed => write!(f, "CONFIRMED"),
        }
    }
}

/// 상태 전이를 유발하는 이벤트
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportEvent {
    /// 신고 시작/재개 (서버가 reportId를 내려줌)
    Started,
    /// 서버 status: "waiting"
    Waiting,
    /// 서버 status: "confirmed"
    Confirmed,
    /// 서버 status: "finished", 사용자 취소, 또는 인증 만료
    Finished,
}

impl ReportState {
    /// 전이 함수.
    ///
    /// `report_active`는 세션이 활성 신고 id를 보유 중인지 여부.
    /// waiting/confirmed 신호는 활성 신고가 없으면 무시된다.
    /// CONFIRMED는 WAITING에서만 진입 가능하다. Finished는 항상 적용된다.
    pub fn apply(self, event: ReportEvent, report_active: bool) -> ReportState {
        match event {
            ReportEvent::Finished => ReportState::None,
            ReportEvent::Started => {
                if report_active {
                    ReportState::Waiting
                } else {
                    self
                }
            }
            ReportEvent::Waiting => {
                if report_active {
                    ReportState::Waiting
                } else {
                    self
                }
            }
            ReportEvent::Confirmed => {
                if report_active && self == ReportState::Waiting {
                    ReportState::Confirmed
                } else {
                    self
                }
            }
        }
    }
}
