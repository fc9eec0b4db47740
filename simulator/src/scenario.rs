//! Simulation scenarios.

use std::fmt;

use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use wallet_common::AccountId;

/// Share of hot-account operations that touch the hot account, in percent.
const HOT_ACCOUNT_SHARE: u32 = 80;

/// A workload shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scenario {
    /// Uniform mix of top-ups, payments and transfers across all accounts.
    Random,
    /// Most operations contend on the first account.
    HotAccount,
    /// Transfers in both directions between the first two accounts.
    Crossfire,
}

/// One operation a worker submits to the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    TopUp {
        account: AccountId,
        amount: Decimal,
    },
    Payment {
        account: AccountId,
        amount: Decimal,
    },
    Transfer {
        sender: AccountId,
        recipient: AccountId,
        amount: Decimal,
    },
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::TopUp { .. } => "top_up",
            Operation::Payment { .. } => "payment",
            Operation::Transfer { .. } => "transfer",
        }
    }
}

impl Scenario {
    /// Load a scenario by name.
    pub fn load(name: &str) -> anyhow::Result<Self> {
        match name {
            "random" => Ok(Self::Random),
            "hot-account" => Ok(Self::HotAccount),
            "crossfire" => Ok(Self::Crossfire),
            _ => Err(anyhow::anyhow!("Unknown scenario: {}", name)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Scenario::Random => "random",
            Scenario::HotAccount => "hot-account",
            Scenario::Crossfire => "crossfire",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Scenario::Random => "Uniform operation mix across all accounts",
            Scenario::HotAccount => "Heavy contention on a single account",
            Scenario::Crossfire => "Opposite-direction transfers between two accounts",
        }
    }

    /// Accounts the scenario needs to be meaningful.
    pub fn min_accounts(&self) -> usize {
        match self {
            Scenario::Random => 1,
            Scenario::HotAccount | Scenario::Crossfire => 2,
        }
    }

    /// Draw the next operation.
    ///
    /// `accounts` must hold at least [`Scenario::min_accounts`] entries.
    /// Transfers always name two distinct accounts.
    pub fn next_operation<R: Rng>(&self, rng: &mut R, accounts: &[AccountId]) -> Operation {
        match self {
            Scenario::Random => {
                let account = accounts[rng.gen_range(0..accounts.len())];
                match rng.gen_range(0..3) {
                    0 => Operation::TopUp {
                        account,
                        amount: random_amount(rng),
                    },
                    1 => Operation::Payment {
                        account,
                        amount: random_amount(rng),
                    },
                    _ => match pick_other(rng, accounts, account) {
                        Some(recipient) => Operation::Transfer {
                            sender: account,
                            recipient,
                            amount: random_amount(rng),
                        },
                        None => Operation::TopUp {
                            account,
                            amount: random_amount(rng),
                        },
                    },
                }
            }
            Scenario::HotAccount => {
                let hot = accounts[0];
                let other = accounts[rng.gen_range(1..accounts.len())];
                let amount = random_amount(rng);
                if rng.gen_range(0..100) >= HOT_ACCOUNT_SHARE {
                    return Operation::TopUp {
                        account: other,
                        amount,
                    };
                }
                match rng.gen_range(0..4) {
                    0 => Operation::TopUp {
                        account: hot,
                        amount,
                    },
                    1 => Operation::Payment {
                        account: hot,
                        amount,
                    },
                    2 => Operation::Transfer {
                        sender: hot,
                        recipient: other,
                        amount,
                    },
                    _ => Operation::Transfer {
                        sender: other,
                        recipient: hot,
                        amount,
                    },
                }
            }
            Scenario::Crossfire => {
                let (sender, recipient) = if rng.gen_bool(0.5) {
                    (accounts[0], accounts[1])
                } else {
                    (accounts[1], accounts[0])
                };
                Operation::Transfer {
                    sender,
                    recipient,
                    amount: Decimal::new(rng.gen_range(1..=1_000), 2),
                }
            }
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 1.00 to 500.00 in whole cents.
fn random_amount<R: Rng>(rng: &mut R) -> Decimal {
    Decimal::new(rng.gen_range(100..=50_000), 2)
}

fn pick_other<R: Rng>(rng: &mut R, accounts: &[AccountId], exclude: AccountId) -> Option<AccountId> {
    if accounts.len() < 2 {
        return None;
    }
    loop {
        let candidate = accounts[rng.gen_range(0..accounts.len())];
        if candidate != exclude {
            return Some(candidate);
        }
    }
}
