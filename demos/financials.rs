use std::sync::Arc;

use yafin::{Frequency, Ticker, YahooConnector, YahooError};

#[tokio::main]
async fn main() -> Result<(), YahooError> {
    env_logger::init();

    let connector = Arc::new(YahooConnector::new()?);
    let tickers = ["AAPL", "META"]
        .into_iter()
        .map(|symbol| Ticker::with_connector(symbol, connector.clone()))
        .collect::<Result<Vec<_>, _>>()?;
    drop(connector);

    for ticker in tickers {
        let profile = ticker.asset_profile().await?;
        println!("{} | {}", ticker.symbol(), profile["sector"]);

        let income = ticker.income_statement(Frequency::Annual, None, None).await?;
        for series in income.as_array().into_iter().flatten() {
            let Some(name) = series["meta"]["type"][0].as_str() else {
                continue;
            };
            if let Some(points) = series[name].as_array() {
                println!("  {name}: {} reports", points.len());
            }
        }

        match ticker.balance_sheet(Frequency::Trailing, None, None).await {
            Err(e) => println!("  trailing balance sheet: {e}"),
            Ok(_) => println!("  unexpected trailing balance sheet"),
        }

        // the last ticker closes the shared connector
        ticker.close().await;
    }
    Ok(())
}
