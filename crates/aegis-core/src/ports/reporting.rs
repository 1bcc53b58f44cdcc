//! 위치 보고 제어 포트.
//!
//! 구현: `aegis-app`의 SosController (보고 루프 태스크 소유).
//! 소비: `aegis-wear` 브리지 (워치의 start/end 요청 처리).

use async_trait::async_trait;

use crate::error::CoreError;

/// 위치 보고 루프의 시작/정지 제어
#[async_trait]
pub trait SosReporting: Send + Sync {
    /// 보고 루프 시작 (이미 실행 중이면 no-op)
    async fn start_reporting(&self) -> Result<(), CoreError>;

    /// 보고 루프 정지 (실행 중이 아니면 no-op)
    async fn stop_reporting(&self) -> Result<(), CoreError>;

    /// 루프 실행 여부
    fn is_reporting(&self) -> bool;
}
