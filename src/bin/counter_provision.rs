use lambda_visit_counter::counter::DynamoDbStore;
use lambda_visit_counter::provision::ProvisionRunner;

pub fn main() -> anyhow::Result<()> {
    lambda_visit_counter::logging::init_from_env()?;
    lambda_visit_counter::exec_tokio::<_, _, ProvisionRunner<DynamoDbStore>, _>()
}
