use crate::adapters::http::default_sources;
use crate::config::Command;
use crate::core::usecases::{CachedRates, PortfolioReport, TradeReceipt, TradeSide, UseCases};
use crate::core::{RateQuote, RatesUpdater, UpdateReport};
use crate::domain::model::Session;
use crate::domain::ports::Storage;
use crate::utils::error::Result;
use std::io::Write;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";
const RULE_WIDTH: usize = 40;

/// 把 CLI 指令分派到 use case，並把結果寫成文字輸出
pub struct App<S: Storage> {
    usecases: UseCases<S>,
    updater: RatesUpdater,
}

impl<S: Storage> App<S> {
    pub fn new(usecases: UseCases<S>) -> Result<Self> {
        let updater = RatesUpdater::new(default_sources(&usecases.settings().parser)?);
        Ok(Self::with_updater(usecases, updater))
    }

    pub fn with_updater(usecases: UseCases<S>, updater: RatesUpdater) -> Self {
        Self { usecases, updater }
    }

    pub fn usecases(&self) -> &UseCases<S> {
        &self.usecases
    }

    pub async fn execute<W: Write>(&mut self, command: Command, out: &mut W) -> Result<()> {
        tracing::debug!("▶️ Executing {:?}", CommandName(&command));

        match command {
            Command::Register(creds) => {
                let user = self.usecases.register(&creds.username, &creds.password).await?;
                writeln!(
                    out,
                    "User '{}' registered (ID: {})",
                    user.username(),
                    user.user_id()
                )?;
                writeln!(
                    out,
                    "Log in with: login --username {} --password ****",
                    user.username()
                )?;
            }
            Command::Login(creds) => {
                let session = self.usecases.login(&creds.username, &creds.password).await?;
                writeln!(out, "Logged in as '{}'", session.username)?;
                write_session(out, &session)?;
            }
            Command::Logout => {
                let was_logged_in = self.usecases.is_authenticated();
                self.usecases.logout().await?;
                if was_logged_in {
                    writeln!(out, "Logged out")?;
                } else {
                    writeln!(out, "Not logged in")?;
                }
            }
            Command::Status => match self.usecases.current_session() {
                Some(session) => {
                    writeln!(out, "Logged in as: {}", session.username)?;
                    write_session(out, session)?;
                }
                None => {
                    writeln!(out, "Not logged in")?;
                    writeln!(out, "Use 'login' to sign in")?;
                }
            },
            Command::ShowPortfolio { base } => {
                let report = self.usecases.portfolio_report(base.as_deref()).await?;
                write!(out, "{}", render_portfolio(&report))?;
            }
            Command::Buy(trade) => {
                let receipt = self.usecases.buy(&trade.currency, trade.amount).await?;
                write!(out, "{}", render_receipt(&receipt))?;
            }
            Command::Sell(trade) => {
                let receipt = self.usecases.sell(&trade.currency, trade.amount).await?;
                write!(out, "{}", render_receipt(&receipt))?;
            }
            Command::GetRate {
                from_currency,
                to_currency,
            } => {
                let quote = self
                    .usecases
                    .exchange_rate(&from_currency, &to_currency)
                    .await?;
                write!(out, "{}", render_quote(&quote))?;
            }
            Command::UpdateRates => {
                writeln!(
                    out,
                    "Updating rates from: {}",
                    self.updater.source_names().join(", ")
                )?;
                let report = self.usecases.update_rates(&self.updater).await?;
                write!(out, "{}", render_update(&report))?;
            }
            Command::ShowRates { currency } => {
                let cached = self.usecases.cached_rates(currency.as_deref()).await?;
                write!(out, "{}", render_cached_rates(&cached))?;
            }
            Command::Currencies => {
                let codes = self.usecases.supported_currencies().await?;
                writeln!(out, "Known currencies: {}", codes.join(", "))?;
            }
            Command::ChangePassword { old, new } => {
                self.usecases.change_password(&old, &new).await?;
                writeln!(out, "Password changed")?;
            }
            Command::Backup => {
                let (path, copied) = self.usecases.backup().await?;
                writeln!(out, "Backed up {} files to {}", copied, path.display())?;
            }
        }

        Ok(())
    }
}

/// 記錄指令時不輸出密碼
struct CommandName<'a>(&'a Command);

impl std::fmt::Debug for CommandName<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            Command::Register(c) => write!(f, "Register({})", c.username),
            Command::Login(c) => write!(f, "Login({})", c.username),
            Command::ChangePassword { .. } => write!(f, "ChangePassword"),
            other => write!(f, "{:?}", other),
        }
    }
}

fn write_session<W: Write>(out: &mut W, session: &Session) -> std::io::Result<()> {
    writeln!(out, "User ID: {}", session.user_id)?;
    writeln!(out, "Login time: {}", session.login_time.format(TIME_FORMAT))
}

pub fn render_portfolio(report: &PortfolioReport) -> String {
    let valuation = &report.valuation;
    if valuation.lines.is_empty() {
        return format!(
            "Portfolio of '{}' is empty\nDeposit funds with: buy --currency USD --amount <amount>\n",
            report.username
        );
    }

    let rule = "-".repeat(RULE_WIDTH);
    let mut lines = vec![
        format!("Portfolio of '{}' (ID: {})", report.username, report.user_id),
        format!("Base currency: {}", valuation.base),
        rule.clone(),
    ];

    for line in &valuation.lines {
        if line.currency == valuation.base {
            lines.push(format!(
                "{}: {:.4} → {:.2} {}",
                line.currency, line.balance, line.value, valuation.base
            ));
        } else {
            let rate = line
                .rate
                .map(|r| format!("{:.4}", r))
                .unwrap_or_else(|| "N/A".to_string());
            lines.push(format!(
                "{}: {:.4} (rate: {}) → {:.2} {}",
                line.currency, line.balance, rate, line.value, valuation.base
            ));
        }
    }

    lines.push(rule);
    lines.push(format!("TOTAL: {:.2} {}", valuation.total, valuation.base));
    lines.join("\n") + "\n"
}

pub fn render_receipt(receipt: &TradeReceipt) -> String {
    let (verb, value_label) = match receipt.side {
        TradeSide::Buy => ("Bought", "Cost"),
        TradeSide::Sell => ("Sold", "Revenue"),
    };
    format!(
        "{} {:.4} {} for {:.2} USD\nRate: {:.4} ({})\n{}: {:.2} USD\nNew {} balance: {:.4}\n",
        verb,
        receipt.amount,
        receipt.currency,
        receipt.usd_value,
        receipt.rate,
        receipt.rate_source,
        value_label,
        receipt.usd_value,
        receipt.currency,
        receipt.new_balance
    )
}

pub fn render_quote(quote: &RateQuote) -> String {
    format!(
        "Rate {} → {}: {:.6}\nSource: {}\nUpdated: {}\n",
        quote.from,
        quote.to,
        quote.rate,
        quote.source,
        quote.updated_at.format(TIME_FORMAT)
    )
}

pub fn render_update(report: &UpdateReport) -> String {
    let mut text = format!(
        "Updated {} rates from {}\nLast refresh: {}\n",
        report.pairs_count,
        report.sources.join(", "),
        report.last_refresh.format(TIME_FORMAT)
    );
    if !report.errors.is_empty() {
        text.push_str("Warnings:\n");
        for error in &report.errors {
            text.push_str(&format!("  - {}\n", error));
        }
    }
    text
}

pub fn render_cached_rates(cached: &CachedRates) -> String {
    if cached.pairs.is_empty() {
        return "No cached rates. Run 'update-rates' first\n".to_string();
    }

    let freshness = if cached.fresh { "fresh" } else { "stale" };
    let mut text = format!(
        "Cached rates (last refresh {}, {})\n",
        cached.last_refresh.format(TIME_FORMAT),
        freshness
    );
    for (key, pair) in &cached.pairs {
        text.push_str(&format!("  {:<10} {:>18.6}  {}\n", key, pair.rate, pair.source));
    }
    text
}
