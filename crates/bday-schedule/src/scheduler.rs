//! スケジューラー
//!
//! トリガーに基づいてジョブを実行します。同じジョブのサイクルは重複せず、
//! シャットダウン時は実行中のサイクルを猶予時間まで待ちます。

use crate::health::{HEARTBEAT_INTERVAL, HealthStatus, StatusFile};
use crate::state::{FireDecision, RunResult, RunState};
use crate::trigger::Trigger;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn};

/// 「稼働中」ログの間隔
const ALIVE_LOG_INTERVAL: Duration = Duration::from_secs(3600);

/// スケジューラーから実行されるジョブ
#[async_trait]
pub trait ScheduledJob: Send + Sync + 'static {
    /// ログ用のジョブ名
    fn name(&self) -> &str;

    /// 1 サイクル実行（結果のログはジョブ側で行う）
    async fn run(&self) -> RunResult;
}

/// 登録するジョブとその実行条件
pub struct Job {
    job: Arc<dyn ScheduledJob>,
    trigger: Trigger,
    run_on_start: bool,
    status_file: Option<StatusFile>,
}

impl Job {
    pub fn new(job: Arc<dyn ScheduledJob>, trigger: Trigger) -> Self {
        Self {
            job,
            trigger,
            run_on_start: false,
            status_file: None,
        }
    }

    /// 起動待ちの直後に 1 回実行する
    pub fn run_on_start(mut self, enabled: bool) -> Self {
        self.run_on_start = enabled;
        self
    }

    /// 状態をステータスファイルに書き出す
    pub fn with_status_file(mut self, file: StatusFile) -> Self {
        self.status_file = Some(file);
        self
    }
}

/// スケジューラーの動作設定
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// 最初のサイクルまでの待ち時間
    pub startup_delay: Duration,
    /// シャットダウン時に実行中のサイクルを待つ上限
    pub shutdown_grace: Duration,
    /// ループが最低限起きる間隔
    pub heartbeat: Duration,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            startup_delay: Duration::from_secs(30),
            shutdown_grace: Duration::from_secs(60),
            heartbeat: HEARTBEAT_INTERVAL,
        }
    }
}

/// スケジューラーのハンドル
pub struct SchedulerHandle {
    /// スケジューラータスクの終了送信
    shutdown_tx: broadcast::Sender<()>,
    /// 実行中のタスクハンドル
    handle: JoinHandle<()>,
}

impl SchedulerHandle {
    /// スケジューラーを停止（実行中のサイクルは猶予時間まで待つ）
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(());
        let _ = self.handle.await;
    }
}

/// スケジューラー
pub struct Scheduler {
    jobs: Vec<Job>,
    options: SchedulerOptions,
}

impl Scheduler {
    /// 新しいスケジューラーを作成
    pub fn new(options: SchedulerOptions) -> Self {
        Self {
            jobs: Vec::new(),
            options,
        }
    }

    /// ジョブを追加
    pub fn add_job(mut self, job: Job) -> Self {
        self.jobs.push(job);
        self
    }

    /// スケジューラーを開始
    pub fn start(self) -> SchedulerHandle {
        let (shutdown_tx, _) = broadcast::channel::<()>(1);

        // stop() が直後に呼ばれても取りこぼさないよう、受信側は先に作る
        let jobs: Vec<_> = self
            .jobs
            .into_iter()
            .map(|job| (job, shutdown_tx.subscribe()))
            .collect();
        let options = self.options;

        let handle = tokio::spawn(async move {
            info!("スケジューラーを開始しました ({} ジョブ)", jobs.len());

            // 各ジョブを別々のタスクで実行
            let mut job_handles = Vec::new();

            for (job, mut rx) in jobs {
                let options = options.clone();

                let handle = tokio::spawn(async move {
                    run_job_loop(job, options, &mut rx).await;
                });

                job_handles.push(handle);
            }

            // 全ジョブが終了するまで待機
            for handle in job_handles {
                let _ = handle.await;
            }

            info!("スケジューラーを停止しました");
        });

        SchedulerHandle {
            shutdown_tx,
            handle,
        }
    }
}

/// 個別ジョブのループ
async fn run_job_loop(job: Job, options: SchedulerOptions, shutdown_rx: &mut broadcast::Receiver<()>) {
    let name = job.job.name().to_string();
    let mut state = RunState::new();

    info!(job = %name, trigger = %job.trigger, "ジョブを登録しました");
    publish(&job, &state);

    // 起動待ち（シャットダウン確認付き）
    if !options.startup_delay.is_zero() {
        info!(job = %name, "起動待ち {} 秒", options.startup_delay.as_secs());
        tokio::select! {
            _ = tokio::time::sleep(options.startup_delay) => {}
            _ = shutdown_rx.recv() => {
                info!(job = %name, "シャットダウン要求を受信");
                publish(&job, &state.terminate());
                return;
            }
        }
    }

    let mut running: Option<JoinHandle<RunResult>> = None;

    if job.run_on_start {
        let (next_state, _) = state.fire(Utc::now());
        state = next_state;
        info!(job = %name, "起動時のサイクルを実行");
        running = Some(spawn_cycle(&job));
    }

    state = state.scheduled(job.trigger.next_after(Utc::now()));
    log_next(&name, &state);
    let mut last_alive = Instant::now();

    loop {
        publish(&job, &state);

        let Some(next) = state.next_fire() else {
            if running.is_none() {
                warn!(job = %name, "次の実行時刻を取得できません");
                break;
            }
            // 実行中のサイクルの完了を待つ（シャットダウン要求は猶予処理へ）
            let shutdown = tokio::select! {
                result = wait_cycle(&mut running) => {
                    running = None;
                    let result = result.unwrap_or_else(|e| panicked(&name, e));
                    state = state.finished(Utc::now(), result);
                    false
                }
                _ = shutdown_rx.recv() => {
                    info!(job = %name, "シャットダウン要求を受信");
                    true
                }
            };
            if shutdown {
                break;
            }
            continue;
        };

        let until_next = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        let wake = until_next.min(options.heartbeat);

        tokio::select! {
            _ = tokio::time::sleep(wake) => {
                let now = Utc::now();
                if now >= next {
                    let (next_state, decision) = state.fire(now);
                    state = next_state;
                    match decision {
                        FireDecision::Run => {
                            info!(job = %name, "スケジュールサイクルを実行");
                            running = Some(spawn_cycle(&job));
                        }
                        FireDecision::SkipOverlap => {
                            warn!(
                                job = %name,
                                missed = state.missed(),
                                "前回のサイクルが実行中のためスキップしました"
                            );
                        }
                    }
                    state = state.scheduled(job.trigger.next_after(now));
                    log_next(&name, &state);
                }

                if last_alive.elapsed() >= ALIVE_LOG_INTERVAL {
                    last_alive = Instant::now();
                    info!(
                        job = %name,
                        next = %format_next(state.next_fire()),
                        running = state.is_running(),
                        "稼働中"
                    );
                }
            }
            result = wait_cycle(&mut running), if running.is_some() => {
                running = None;
                let result = result.unwrap_or_else(|e| panicked(&name, e));
                debug!(job = %name, success = result.success, "サイクル完了");
                state = state.finished(Utc::now(), result);
            }
            _ = shutdown_rx.recv() => {
                info!(job = %name, "シャットダウン要求を受信");
                break;
            }
        }
    }

    if let Some(mut handle) = running.take() {
        info!(
            job = %name,
            "実行中のサイクルの完了を待機 (最大 {} 秒)",
            options.shutdown_grace.as_secs()
        );
        match tokio::time::timeout(options.shutdown_grace, &mut handle).await {
            Ok(Ok(result)) => state = state.finished(Utc::now(), result),
            Ok(Err(e)) => state = state.finished(Utc::now(), panicked(&name, e)),
            Err(_) => {
                warn!(job = %name, "猶予時間内に完了しなかったためサイクルを中断します");
                handle.abort();
            }
        }
    }

    publish(&job, &state.terminate());
    info!(job = %name, "ジョブを終了しました");
}

fn spawn_cycle(job: &Job) -> JoinHandle<RunResult> {
    let job = Arc::clone(&job.job);
    tokio::spawn(async move { job.run().await })
}

/// 実行中のサイクルを待つ（なければ永久に待機）
async fn wait_cycle(running: &mut Option<JoinHandle<RunResult>>) -> Result<RunResult, JoinError> {
    match running.as_mut() {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}

fn panicked(name: &str, e: JoinError) -> RunResult {
    error!(job = %name, "サイクルが異常終了しました: {}", e);
    RunResult::failure(format!("cycle task failed: {}", e))
}

fn publish(job: &Job, state: &RunState) {
    let Some(file) = &job.status_file else {
        return;
    };
    let status = HealthStatus::from_state(job.job.name(), state, Utc::now());
    if let Err(e) = file.write(&status) {
        warn!(path = %file.path().display(), "ステータスファイルを書き込めません: {}", e);
    }
}

fn log_next(name: &str, state: &RunState) {
    info!(job = %name, next = %format_next(state.next_fire()), "次回実行まで待機中");
}

fn format_next(next: Option<DateTime<Utc>>) -> String {
    match next {
        Some(t) => t
            .with_timezone(&chrono::Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string(),
        None => "-".to_string(),
    }
}
