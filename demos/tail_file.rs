use log_tailer::{CancellationToken, Options, Tailer};
use std::io::SeekFrom;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "access.log".to_string());

    let tailer = Tailer::new(
        &path,
        Options::default()
            .with_seek_on_startup(SeekFrom::Start(0))
            .with_poll_timeout(Duration::from_millis(10)),
    );

    // Stop on our own after a few seconds
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            cancel.cancel();
        });
    }

    let (mut lines, mut errors) = tailer.run(cancel).await?.into_streams();

    println!("Tailing file: {}", tailer.file_name().display());
    loop {
        tokio::select! {
            line = lines.recv() => match line {
                Some(line) => println!("{}", line.text_trimmed()),
                None => return Ok(()),
            },
            err = errors.recv() => match err {
                Some(e) => return Err(e.into()),
                None => return Ok(()),
            },
        }
    }
}
