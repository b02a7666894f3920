use edge_bridge::{BackgroundTasks, BridgeState, TaskKind, setup_environment};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. 设置环境 (dotenv, 日志) 并加载配置
    let config = setup_environment();
    tracing::info!(environment = %config.environment, "Edge bridge starting...");

    // 2. 初始化组件
    let state = BridgeState::initialize(&config).await?;

    // 3. 注册后台任务
    let mut tasks = BackgroundTasks::new();
    match state.archive_scheduler(tasks.shutdown_token())? {
        Some(scheduler) => tasks.spawn("event_archiver", TaskKind::Periodic, scheduler.run()),
        None => tracing::info!("Event archiver inactive"),
    }
    tasks.log_summary();

    // 4. 等待 Ctrl-C
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    tasks.shutdown().await;
    state.store.pool().close().await;
    tracing::info!("Edge bridge stopped");
    Ok(())
}
