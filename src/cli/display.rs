use crate::core::{AllowanceState, Offer, OfferState};
use crate::orchestrator::OffersSnapshot;
use crate::providers::out_of_limits_message;
use crate::utils::format_amount;
use colored::*;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Display helper for offer snapshots.
pub struct OfferDisplay;

impl OfferDisplay {
    pub fn create_progress_bar(message: &str) -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(message.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    /// Render one settled snapshot. `coin_from`/`coin_to` are only used
    /// for labels.
    pub fn display_snapshot(snapshot: &OffersSnapshot, coin_from: &str, coin_to: &str, all: bool) {
        if let Some(warning) = &snapshot.warning {
            println!("{}", warning.yellow().bold());
        }

        let offers: Vec<&Offer> = match (all, snapshot.selected) {
            (false, Some(selected)) => snapshot
                .offers
                .iter()
                .filter(|o| o.key == selected)
                .collect(),
            _ => snapshot.offers.iter().collect(),
        };

        for offer in offers {
            let is_best = snapshot.selected == Some(offer.key);
            Self::display_offer(offer, coin_from, coin_to, is_best);
        }
    }

    fn display_offer(offer: &Offer, coin_from: &str, coin_to: &str, is_best: bool) {
        let best_marker = if is_best {
            " ★ BEST".bright_green().bold()
        } else {
            "".normal()
        };
        println!("{} {}{}", style("►").cyan(), offer.name.bold(), best_marker);

        match &offer.state {
            OfferState::Loading => {
                println!("  {}", "loading...".dimmed());
            }
            OfferState::Success => {
                if let Some(amount) = offer.amount_receiving {
                    println!(
                        "  Receiving: {} {}",
                        format_amount(amount, 8).green().bold(),
                        coin_to.to_uppercase()
                    );
                }
                if let Some(rate) = offer.rate {
                    let fiat = offer
                        .rate_fiat
                        .map(|f| format!(" (~{} fiat)", format_amount(f, 2)))
                        .unwrap_or_default();
                    println!(
                        "  Rate: 1 {} = {} {}{}",
                        coin_from.to_uppercase(),
                        format_amount(rate, 6),
                        coin_to.to_uppercase(),
                        fiat
                    );
                }
                if let (Some(min), Some(slippage)) = (offer.min_receive, offer.slippage) {
                    println!(
                        "  Min receive: {} {} ({}% slippage)",
                        format_amount(min, 8),
                        coin_to.to_uppercase(),
                        format_amount(slippage, 2)
                    );
                }
                if let Some(path) = &offer.route_path {
                    println!("  Route: {}", style(path).dim());
                }
                if let Some(secs) = offer.estimated_time_secs {
                    println!("  Estimated time: {}", format_duration(secs));
                }
                if offer.requires_approval {
                    let approval = offer
                        .approval
                        .map(|a| a.to_string())
                        .unwrap_or_else(|| AllowanceState::Unknown.to_string());
                    println!("  Approval: {}", approval.yellow());
                }
            }
            OfferState::OutOfLimits(limits) => {
                println!(
                    "  {}",
                    out_of_limits_message(&offer.name, coin_from, limits).yellow()
                );
            }
            OfferState::Error(msg) => {
                println!("  {} {}", "Error:".red().bold(), msg.red());
            }
        }
        println!();
    }
}

fn format_duration(secs: u64) -> String {
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;
    format!("{}h {}m {}s", hours, minutes, seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(105), "0h 1m 45s");
        assert_eq!(format_duration(3725), "1h 2m 5s");
        assert_eq!(format_duration(0), "0h 0m 0s");
    }
}
