use yafin::{YahooConnector, YahooError};

#[tokio::main]
async fn main() -> Result<(), YahooError> {
    env_logger::init();

    let provider = YahooConnector::new()?;
    provider
        .with_session(|p| async move {
            let found = p.get_search("Apple").await?;
            for quote in found["quotes"].as_array().into_iter().flatten() {
                println!("{} | {}", quote["symbol"], quote["shortname"]);
            }

            for item in p.get_trending().await?["quotes"].as_array().into_iter().flatten() {
                println!("trending: {}", item["symbol"]);
            }

            let news = p.get_news("AAPL", 5).await?;
            for item in news.as_array().into_iter().flatten() {
                println!("news: {}", item["content"]["title"]);
            }
            Ok::<(), YahooError>(())
        })
        .await
}
