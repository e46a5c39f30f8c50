use lambda_visit_counter::counter::MemoryStore;
use lambda_visit_counter::visit::{Response, VisitRunner};

#[test]
fn test_visit_lambda() {
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .init()
        .expect("Unable to setup logging");
    std::env::set_var("DDB_TABLE_NAME", "siteVisitCounterTable");

    let test_data = include_str!("./visit.json");
    let results = lambda_visit_counter::exec_test::<_, _, VisitRunner<MemoryStore>, _>(test_data)
        .expect("Unable to execute lambda");
    let counts: Vec<i64> = results.iter().map(|r: &Response| r.visit_count).collect();
    assert_eq!(counts, vec![1, 2, 3, 2]);
    assert!(results.iter().all(|r| r.site == "myCRCSite"));
}
