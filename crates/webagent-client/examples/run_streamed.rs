use webagent_client::prelude::*;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), ClientError> {
    let client = WebAgentClient::from_env()?;

    let request = RunRequest::builder(
        "https://scrapeme.live/shop",
        "List the first three product names with their prices",
    )
    .build()?;

    let result = client
        .run_streamed_with(&request, StreamTimeout::default(), |event| match event {
            ProtocolEvent::Started { run_id } => eprintln!("started {run_id}"),
            ProtocolEvent::StreamingUrlAnnounced { url } => eprintln!("watch live: {url}"),
            ProtocolEvent::Progress { purpose } => eprintln!("... {purpose}"),
            ProtocolEvent::Complete(_) => {}
        })
        .await;

    match result {
        Ok(outcome) => println!("{}", outcome.to_json()),
        Err(err) => match err.timeout_outcome() {
            Some(timed_out) => println!("{}", timed_out.to_json()),
            None => return Err(err),
        },
    }
    Ok(())
}
