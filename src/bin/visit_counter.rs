use lambda_visit_counter::counter::DynamoDbStore;
use lambda_visit_counter::visit::VisitRunner;

pub fn main() -> anyhow::Result<()> {
    lambda_visit_counter::logging::init_from_env()?;
    lambda_visit_counter::exec_tokio::<_, _, VisitRunner<DynamoDbStore>, _>()
}
