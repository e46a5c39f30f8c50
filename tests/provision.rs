use lambda_visit_counter::counter::{CounterStore, MemoryStore};
use lambda_visit_counter::provision::{self, Callback, Event, Response, Status};

#[derive(Debug, Default)]
struct Recorder {
    urls: tokio::sync::Mutex<Vec<String>>,
}

#[async_trait::async_trait]
impl Callback for Recorder {
    async fn send(&self, url: &str, _response: &Response) -> anyhow::Result<()> {
        self.urls.lock().await.push(url.to_owned());
        Ok(())
    }
}

struct Runner;

#[async_trait::async_trait]
impl lambda_visit_counter::Runner<provision::Shared<MemoryStore, Recorder>, Event, Response>
    for Runner
{
    async fn setup(_region: &str) -> anyhow::Result<provision::Shared<MemoryStore, Recorder>> {
        simple_logger::SimpleLogger::new()
            .with_level(log::LevelFilter::Info)
            .init()
            .expect("Unable to setup logging");
        Ok(provision::Shared {
            counter: CounterStore::new(MemoryStore::new(), std::time::Duration::from_secs(1)),
            callback: Recorder::default(),
            key: "myCRCSite".into(),
        })
    }

    async fn run<'a>(
        shared: &'a provision::Shared<MemoryStore, Recorder>,
        event: lambda_visit_counter::LambdaEvent<'a, Event>,
    ) -> anyhow::Result<Response> {
        let response =
            provision::process(shared, &event.event, event.log_stream, event.deadline).await?;
        // Only the first Create may create the record
        let value = shared.counter.store().value("myCRCSite").await;
        anyhow::ensure!(value == Some(0), "Unexpected counter value {:?}", value);
        anyhow::ensure!(
            shared.counter.store().value("blog").await.is_none(),
            "Update must not create records"
        );
        anyhow::ensure!(
            shared.callback.urls.lock().await.last() == Some(&event.event.response_url),
            "No response sent to {}",
            event.event.response_url
        );
        Ok(response)
    }
}

#[test]
fn test_provision_lambda() {
    let test_data = include_str!("./provision.json");
    let results = lambda_visit_counter::exec_test::<_, _, Runner, _>(test_data)
        .expect("Unable to execute lambda");
    assert!(results.iter().all(|r| r.status == Status::Success));
    let data: Vec<&str> = results
        .iter()
        .flat_map(|r| r.data.keys().map(String::as_str))
        .collect();
    assert_eq!(data, vec!["Create", "Update", "Skip", "Delete"]);
    assert!(results.iter().all(|r| r.physical_resource_id == "local-test"));
}

#[test]
fn test_provision_event_parsing() {
    let test_data = include_str!("./provision.json");
    let data: lambda_visit_counter::TestData<Event> =
        serde_json::from_str(test_data).expect("Unable to parse test data");
    let _ = format!("{:?}", data);
}
