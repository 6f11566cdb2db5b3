/// Analyzer functions: pure `f(SwapInputs) -> AnalysisResult` transforms the
/// core invokes and persists the output of. Internal math beyond realized
/// P&L (average cost basis) is intentionally minimal — advanced stats and
/// similarity vectors are out of scope for the core.
use std::collections::HashMap;

use crate::storage::models::{
    AnalysisResult, Scope, SwapAnalysisInput, SwapDirection, WalletBehaviorProfile,
    WalletPnlSummary,
};

#[derive(Default, Clone)]
struct Position {
    held_amount: f64,
    cost_basis_sol: f64,
    realized_pnl_sol: f64,
    bought_sol: f64,
    sold_sol: f64,
    trade_count: i32,
    wins: i32,
}

/// Average-cost-basis realized P&L per token mint, plus an aggregate
/// wallet summary and a lightweight behavior profile.
pub fn analyze(
    wallet_address: &str,
    scope: Scope,
    inputs: &[SwapAnalysisInput],
) -> (Vec<AnalysisResult>, WalletPnlSummary, WalletBehaviorProfile) {
    let mut positions: HashMap<String, Position> = HashMap::new();
    let mut hold_durations_secs: Vec<f64> = Vec::new();
    let mut last_buy_at: HashMap<String, chrono::DateTime<chrono::Utc>> = HashMap::new();
    let mut flips = 0u32;

    for input in inputs {
        let pos = positions.entry(input.mint.clone()).or_default();

        match input.direction {
            SwapDirection::In => {
                pos.held_amount += input.token_amount;
                pos.cost_basis_sol += input.sol_value;
                pos.bought_sol += input.sol_value;
                last_buy_at.insert(input.mint.clone(), input.timestamp);
            }
            SwapDirection::Out => {
                if pos.held_amount > 0.0 {
                    let avg_cost = pos.cost_basis_sol / pos.held_amount;
                    let cost_of_sold = avg_cost * input.token_amount.min(pos.held_amount);
                    let pnl = input.sol_value - cost_of_sold;

                    pos.realized_pnl_sol += pnl;
                    pos.sold_sol += input.sol_value;
                    pos.trade_count += 1;
                    if pnl > 0.0 {
                        pos.wins += 1;
                    }

                    pos.cost_basis_sol = (pos.cost_basis_sol - cost_of_sold).max(0.0);
                    pos.held_amount = (pos.held_amount - input.token_amount).max(0.0);

                    if let Some(bought_at) = last_buy_at.get(&input.mint) {
                        let secs = (input.timestamp - *bought_at).num_seconds().max(0) as f64;
                        hold_durations_secs.push(secs);
                        if secs < 3600.0 {
                            flips += 1;
                        }
                    }
                }
            }
        }
    }

    let mut results: Vec<AnalysisResult> = positions
        .into_iter()
        .filter(|(_, p)| p.trade_count > 0)
        .map(|(mint, p)| AnalysisResult {
            wallet_address: wallet_address.to_string(),
            scope,
            token_mint: mint,
            realized_pnl_sol: p.realized_pnl_sol,
            total_bought: p.bought_sol,
            total_sold: p.sold_sol,
            trade_count: p.trade_count,
            win_rate: if p.trade_count > 0 {
                p.wins as f64 / p.trade_count as f64
            } else {
                0.0
            },
        })
        .collect();

    results.sort_by(|a, b| b.realized_pnl_sol.partial_cmp(&a.realized_pnl_sol).unwrap());

    let total_trades: i32 = results.iter().map(|r| r.trade_count).sum();
    let total_pnl: f64 = results.iter().map(|r| r.realized_pnl_sol).sum();
    let total_wins: f64 = results
        .iter()
        .map(|r| r.win_rate * r.trade_count as f64)
        .sum();

    let summary = WalletPnlSummary {
        wallet_address: wallet_address.to_string(),
        scope,
        total_realized_pnl_sol: total_pnl,
        total_trades,
        win_rate: if total_trades > 0 {
            total_wins / total_trades as f64
        } else {
            0.0
        },
        best_token: results.first().map(|r| r.token_mint.clone()),
        worst_token: results.last().map(|r| r.token_mint.clone()),
        last_analyzed_at: chrono::Utc::now(),
    };

    let avg_hold_time_secs = if hold_durations_secs.is_empty() {
        0.0
    } else {
        hold_durations_secs.iter().sum::<f64>() / hold_durations_secs.len() as f64
    };

    let mut behavior_tags = Vec::new();
    let flip_rate = if total_trades > 0 {
        flips as f64 / total_trades as f64
    } else {
        0.0
    };
    if flip_rate > 0.5 {
        behavior_tags.push("flipper".to_string());
    }
    if avg_hold_time_secs > 86_400.0 * 7.0 {
        behavior_tags.push("holder".to_string());
    }

    let behavior = WalletBehaviorProfile {
        wallet_address: wallet_address.to_string(),
        scope,
        behavior_tags,
        avg_hold_time_secs,
        flip_rate,
        updated_at: chrono::Utc::now(),
    };

    (results, summary, behavior)
}

/// Per-mint realized P&L vector for similarity comparison — keyed by
/// `token_mint`, sized to whatever set of mints the wallet actually traded.
pub fn pnl_vector(results: &[AnalysisResult]) -> HashMap<String, f64> {
    results
        .iter()
        .map(|r| (r.token_mint.clone(), r.realized_pnl_sol))
        .collect()
}

/// Cosine similarity over the union of both wallets' traded mints; mints
/// traded by only one side contribute a zero on the other.
pub fn cosine_similarity(a: &HashMap<String, f64>, b: &HashMap<String, f64>) -> f64 {
    let mints: std::collections::HashSet<&String> = a.keys().chain(b.keys()).collect();
    if mints.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;
    for mint in mints {
        let va = a.get(mint).copied().unwrap_or(0.0);
        let vb = b.get(mint).copied().unwrap_or(0.0);
        dot += va * vb;
        norm_a += va * va;
        norm_b += vb * vb;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a.sqrt() * norm_b.sqrt())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, Utc};

    fn input(direction: SwapDirection, mint: &str, sol: f64, amount: f64, secs_ago: i64) -> SwapAnalysisInput {
        SwapAnalysisInput {
            wallet_address: "wallet".to_string(),
            signature: format!("sig-{secs_ago}-{amount}"),
            direction,
            mint: mint.to_string(),
            sol_value: sol,
            token_amount: amount,
            fee_lamports: 5000,
            interaction_type: "SWAP".to_string(),
            timestamp: Utc::now() - ChronoDuration::seconds(secs_ago),
        }
    }

    #[test]
    fn computes_realized_pnl_on_full_exit() {
        let inputs = vec![
            input(SwapDirection::In, "MINT", 1.0, 100.0, 1000),
            input(SwapDirection::Out, "MINT", 1.5, 100.0, 500),
        ];
        let (results, summary, _) = analyze("wallet", Scope::Flash, &inputs);
        assert_eq!(results.len(), 1);
        assert!((results[0].realized_pnl_sol - 0.5).abs() < 1e-9);
        assert_eq!(summary.total_trades, 1);
        assert_eq!(summary.win_rate, 1.0);
    }

    #[test]
    fn ignores_sells_with_no_prior_buy() {
        let inputs = vec![input(SwapDirection::Out, "MINT", 1.0, 50.0, 10)];
        let (results, summary, _) = analyze("wallet", Scope::Flash, &inputs);
        assert!(results.is_empty());
        assert_eq!(summary.total_trades, 0);
    }

    #[test]
    fn identical_pnl_vectors_are_maximally_similar() {
        let mut a = HashMap::new();
        a.insert("MINT_A".to_string(), 1.0);
        a.insert("MINT_B".to_string(), -0.5);
        let b = a.clone();
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn disjoint_mints_are_not_similar() {
        let mut a = HashMap::new();
        a.insert("MINT_A".to_string(), 1.0);
        let mut b = HashMap::new();
        b.insert("MINT_B".to_string(), 1.0);
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }
}
