pub mod audit;
pub mod capture;
pub mod constrain;
pub mod dispatch;
pub mod headers;
pub mod infer;
pub mod row;
pub mod shared;
pub mod sync;

#[cfg(test)]
pub async fn test_context() -> crate::context::AppContext {
    let mut config = tally_config::TallyConfig::default();
    config.database.path = ":memory:".into();
    crate::context::AppContext::init(config)
        .await
        .expect("in-memory context should open")
}
