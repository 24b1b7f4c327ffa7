use time::OffsetDateTime;

use yafin::{Ticker, YahooError};

#[tokio::main]
async fn main() -> Result<(), YahooError> {
    env_logger::init();

    let ticker = Ticker::new("OKE")?;
    let chart = ticker.chart_data("6mo", "1d", true, true).await?;

    let meta = chart.metadata();
    println!(
        "{} ({})",
        meta.symbol,
        meta.currency.as_deref().unwrap_or("-")
    );
    println!("QUOTES");
    for quote in chart.quotes()? {
        let time = OffsetDateTime::from_unix_timestamp(quote.timestamp).unwrap();
        println!("{} | {:.2} | {:.2}", time.date(), quote.open, quote.close);
    }

    println!("DIVIDENDS");
    for dividend in chart.dividends() {
        let date = OffsetDateTime::from_unix_timestamp(dividend.date).unwrap();
        println!("{} | {:.3}", date.date(), dividend.amount);
    }

    println!("SPLITS");
    for split in chart.splits() {
        let date = OffsetDateTime::from_unix_timestamp(split.date).unwrap();
        println!("{} | {}", date.date(), split.split_ratio);
    }

    ticker.close().await;
    Ok(())
}
