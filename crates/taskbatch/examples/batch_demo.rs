//! Runs ten tasks on three workers; two of them always fail.
//!
//! ```sh
//! RUST_LOG=debug cargo run -p taskbatch --example batch_demo
//! ```

use std::time::Duration;

use anyhow::bail;
use taskbatch::prelude::*;

fn main() -> anyhow::Result<()> {
    taskbatch::telemetry::init();

    let runner = TaskRunner::with_overrides(
        "demo",
        SettingsOverrides::new()
            .with_max_workers(3)
            .with_retries(1)
            .with_retry_delay(0.5),
    )?;

    let items: Vec<String> = (0..10).map(|i| format!("data-{i}")).collect();

    let task = TaskFn::blocking(|t: &Target<String>| {
        t.logger().info(format!("Processing {}", t.data()));
        std::thread::sleep(Duration::from_millis(200));
        if t.data() == "data-3" || t.data() == "data-7" {
            bail!("simulated failure for {}", t.data());
        }
        Ok(format!("processed {}", t.data()))
    });

    let callbacks = Callbacks::new()
        .on_success(|t: &Target<String>, result: &String| {
            t.logger().info(format!("Callback: {result}"));
        })
        .on_error(|t: &Target<String>, err: &anyhow::Error| {
            t.logger().warn(format!("Callback: {} gave up ({err})", t.data()));
        });

    runner.submit_tasks(items, task, callbacks, SubmitOptions::new())?;
    runner.shutdown(true);

    Ok(())
}
