//! SOS 보고 제어기.
//!
//! `SosReporting` 포트 구현. 위치 보고 루프 태스크를 소유하며
//! 시작/정지를 멱등하게 처리한다. 루프가 스스로 종료한 경우
//! (신고 종료, 인증 실패) 활성 플래그가 자동으로 내려간다.

use aegis_core::error::CoreError;
use aegis_core::ports::reporting::SosReporting;
use aegis_location::reporter::LocationReporter;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// 보고 루프 태스크 소유자
pub struct SosController {
    reporter: Arc<LocationReporter>,
    /// (정지 신호, 루프 태스크)
    task: Mutex<Option<(watch::Sender<bool>, JoinHandle<()>)>>,
    active: Arc<AtomicBool>,
}

impl SosController {
    /// 새 제어기 생성
    pub fn new(reporter: Arc<LocationReporter>) -> Arc<Self> {
        Arc::new(Self {
            reporter,
            task: Mutex::new(None),
            active: Arc::new(AtomicBool::new(false)),
        })
    }
}

#[async_trait]
impl SosReporting for SosController {
    async fn start_reporting(&self) -> Result<(), CoreError> {
        let mut task = self.task.lock().await;
        if let Some((_, handle)) = task.as_ref() {
            if !handle.is_finished() {
                debug!("보고 루프 이미 실행 중 — 시작 무시");
                return Ok(());
            }
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let reporter = self.reporter.clone();
        let active = self.active.clone();
        active.store(true, Ordering::SeqCst);

        let handle = tokio::spawn(async move {
            let exit = reporter.run(stop_rx).await;
            info!("보고 루프 종료: {exit:?}");
            active.store(false, Ordering::SeqCst);
        });

        *task = Some((stop_tx, handle));
        Ok(())
    }

    async fn stop_reporting(&self) -> Result<(), CoreError> {
        let taken = self.task.lock().await.take();
        match taken {
            Some((stop_tx, handle)) => {
                let _ = stop_tx.send(true);
                if let Err(e) = handle.await {
                    warn!("보고 태스크 join 실패: {e}");
                }
                Ok(())
            }
            None => {
                debug!("보고 루프 미실행 — 정지 무시");
                Ok(())
            }
        }
    }

    fn is_reporting(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}
