//! Integration tests for scheduler configuration loading.

use std::time::Duration;

use reactor_core::{Config, ReactorError};
use reactor_scheduler::{LoadLevel, Scheduler, SchedulerConfig, assess_load};

#[test]
fn load_from_file() {
    let path = std::env::temp_dir().join(format!("reactor-{}.toml", uuid::Uuid::new_v4()));
    std::fs::write(
        &path,
        "default_timeout_ms = 250\nqueue_elevated_threshold = 2\nqueue_critical_threshold = 4\n",
    )
    .unwrap();

    let config = SchedulerConfig::from_file(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(config.default_timeout(), Some(Duration::from_millis(250)));
    assert_eq!(assess_load(3, &config), LoadLevel::Elevated);
    assert_eq!(assess_load(5, &config), LoadLevel::Critical);
}

#[test]
fn missing_file_is_an_io_error() {
    let path = std::env::temp_dir().join(format!("reactor-missing-{}.toml", uuid::Uuid::new_v4()));
    assert!(matches!(SchedulerConfig::from_file(&path), Err(ReactorError::Io(_))));
}

#[tokio::test(start_paused = true)]
async fn profile_config_drives_the_default_timeout() {
    std::env::set_var("CFGTIMEOUT_REACTOR_DEFAULT_TIMEOUT_MS", "30");
    let core = Config::for_profile("cfgtimeout");
    std::env::remove_var("CFGTIMEOUT_REACTOR_DEFAULT_TIMEOUT_MS");
    core.validate().unwrap();

    let scheduler = Scheduler::new(SchedulerConfig::from(&core));
    let handle = scheduler.submit_task(reactor_scheduler::Task::new(|| {
        futures::future::pending::<anyhow::Result<()>>()
    }));
    assert_eq!(
        handle.await,
        Err(reactor_scheduler::ExecutionError::TimeoutExceeded(
            Duration::from_millis(30)
        ))
    );
}
