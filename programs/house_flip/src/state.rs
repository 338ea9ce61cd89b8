//! Account layouts and the round settlement state machine.
//!
//! Every method here takes the slot and timestamp as arguments instead of
//! reading the `Clock` sysvar, so the whole lifecycle can be driven from
//! unit tests.

use anchor_lang::prelude::*;

use crate::bridge::{CallbackDescriptor, CallbackInvocation, RandomnessBridge};
use crate::FlipError;

/// Upper bound on the per-user history ring. Keeps `UserState` under the
/// 10KiB limit for accounts created through CPI.
pub const MAX_HISTORY_CAPACITY: u32 = 200;

/// History capacity clients pass to `user_init` unless they need more.
pub const DEFAULT_HISTORY_CAPACITY: u32 = 48;

/// Slot and wall-clock time of the instruction being processed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SlotClock {
    pub slot: u64,
    pub unix_timestamp: i64,
}

impl From<&Clock> for SlotClock {
    fn from(clock: &Clock) -> Self {
        Self {
            slot: clock.slot,
            unix_timestamp: clock.unix_timestamp,
        }
    }
}

// === Types ===

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, Default, PartialEq, Eq, InitSpace)]
pub enum GameType {
    #[default]
    CoinFlip,
    SixSidedDie,
    TwentySidedDie,
}

impl GameType {
    /// Number of possible outcomes; valid guesses and results are `1..=sides`.
    pub fn sides(&self) -> u8 {
        match self {
            GameType::CoinFlip => 2,
            GameType::SixSidedDie => 6,
            GameType::TwentySidedDie => 20,
        }
    }

    pub fn is_valid_outcome(&self, value: u8) -> bool {
        value >= 1 && value <= self.sides()
    }
}

/// How much the vault pays on a winning guess, on top of the returned stake.
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, Default, PartialEq, Eq, InitSpace)]
pub enum PayoutPolicy {
    /// 1:1 regardless of the game type.
    #[default]
    EvenMoney,
    /// `sides - 1` to 1, so every game has zero edge for either side.
    TrueOdds,
}

impl PayoutPolicy {
    pub fn multiplier(&self, game_type: GameType) -> u64 {
        match self {
            PayoutPolicy::EvenMoney => 1,
            PayoutPolicy::TrueOdds => game_type.sides() as u64 - 1,
        }
    }
}

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, Default, PartialEq, Eq, InitSpace)]
pub enum RoundStatus {
    #[default]
    Idle,
    Requested,
    Settled,
}

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, Default, PartialEq, Eq, InitSpace)]
pub struct Round {
    pub round_id: u64,
    pub game_type: GameType,
    pub guess: u8,
    pub bet_amount: u64,
    /// Winnings per staked token, fixed when the bet is admitted.
    pub payout_multiplier: u64,
    pub status: RoundStatus,
    /// 0 until the round settles.
    pub result: u8,
    pub request_slot: u64,
    pub request_timestamp: i64,
    pub settle_slot: u64,
    pub settle_timestamp: i64,
}

impl Round {
    pub fn outcome(&self) -> Option<u8> {
        match self.status {
            RoundStatus::Settled => Some(self.result),
            _ => None,
        }
    }

    pub fn user_won(&self) -> Option<bool> {
        self.outcome().map(|result| result == self.guess)
    }

    pub fn winning_payout(&self) -> Option<u64> {
        self.bet_amount.checked_mul(self.payout_multiplier)
    }
}

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, Default, PartialEq, Eq, InitSpace)]
pub struct HistoryEntry {
    pub round_id: u64,
    pub game_type: GameType,
    pub guess: u8,
    pub result: u8,
    pub bet_amount: u64,
    pub payout: u64,
    pub user_won: bool,
    pub settle_slot: u64,
}

impl HistoryEntry {
    pub fn settled(round: &Round, payout: u64) -> Self {
        Self {
            round_id: round.round_id,
            game_type: round.game_type,
            guess: round.guess,
            result: round.result,
            bet_amount: round.bet_amount,
            payout,
            user_won: round.guess == round.result,
            settle_slot: round.settle_slot,
        }
    }
}

/// Fixed-capacity ring of settled rounds. `entries` is allocated to
/// `capacity` slots at creation and never resized; `idx` is the next slot
/// to overwrite.
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Debug, PartialEq, Eq, InitSpace)]
pub struct RoundHistory {
    pub idx: u32,
    pub capacity: u32,
    pub filled: u32,
    #[max_len(200)]
    pub entries: Vec<HistoryEntry>,
}

impl RoundHistory {
    pub fn with_capacity(capacity: u32) -> Result<Self> {
        require!(
            capacity >= 1 && capacity <= MAX_HISTORY_CAPACITY,
            FlipError::InvalidHistoryCapacity
        );
        Ok(Self {
            idx: 0,
            capacity,
            filled: 0,
            entries: vec![HistoryEntry::default(); capacity as usize],
        })
    }

    pub fn push(&mut self, entry: HistoryEntry) {
        let capacity = self.entries.len();
        if capacity == 0 {
            return;
        }
        let slot = self.idx as usize % capacity;
        self.entries[slot] = entry;
        self.idx = ((slot + 1) % capacity) as u32;
        self.filled = self.filled.saturating_add(1).min(capacity as u32);
    }

    pub fn latest(&self) -> Option<&HistoryEntry> {
        self.iter_recent().next()
    }

    /// Settled rounds from newest to oldest.
    pub fn iter_recent(&self) -> impl Iterator<Item = &HistoryEntry> + '_ {
        let capacity = self.entries.len();
        let newest = self.idx as usize + capacity;
        (0..self.filled as usize).map(move |back| &self.entries[(newest - 1 - back) % capacity])
    }
}

// === House ===

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, PartialEq, Eq, InitSpace)]
pub struct HouseConfig {
    pub payout_policy: PayoutPolicy,
    pub max_bet: u64,
    /// Reserve the vault must still hold after covering a new bet's payout.
    pub min_vault_balance: u64,
    /// Lamports escrowed per request for the oracle that answers it.
    pub request_fee: u64,
    /// Slots after which an unanswered request can be reclaimed.
    pub request_timeout_slots: u64,
    pub airdrop_amount: u64,
    pub initial_airdrop_amount: u64,
    pub airdrop_cooldown_slots: u64,
}

impl Default for HouseConfig {
    fn default() -> Self {
        Self {
            payout_policy: PayoutPolicy::EvenMoney,
            max_bet: 100 * 1_000_000_000,
            min_vault_balance: 0,
            request_fee: 2_000_000,
            request_timeout_slots: 1_500,
            airdrop_amount: 1_000_000_000,
            initial_airdrop_amount: 10 * 1_000_000_000,
            airdrop_cooldown_slots: 5_000,
        }
    }
}

impl HouseConfig {
    pub fn validate(&self) -> Result<()> {
        require!(self.max_bet > 0, FlipError::InvalidHouseConfig);
        require!(self.request_timeout_slots > 0, FlipError::InvalidHouseConfig);
        require!(self.airdrop_cooldown_slots > 0, FlipError::InvalidHouseConfig);
        require!(
            self.initial_airdrop_amount >= self.airdrop_amount,
            FlipError::InvalidHouseConfig
        );
        Ok(())
    }
}

#[account]
#[derive(InitSpace)]
pub struct HouseState {
    pub authority: Pubkey,
    pub mint: Pubkey,
    pub vault: Pubkey,
    /// Signer identity allowed to deliver settlement callbacks.
    pub oracle_binding: Pubkey,
    pub enclave_measurement: [u8; 32],
    pub config: HouseConfig,
    pub total_rounds: u64,
    pub total_volume: u64,
    pub total_payout: u64,
    pub total_collected: u64,
    pub bump: u8,
}

/// House statistics after a settlement, computed before anything is written.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HouseTotals {
    pub total_rounds: u64,
    pub total_volume: u64,
    pub total_payout: u64,
    pub total_collected: u64,
}

impl HouseState {
    pub fn is_oracle_configured(&self) -> bool {
        self.oracle_binding != Pubkey::default()
    }

    /// Admission control for a new request: the vault has to cover the
    /// largest possible payout plus the configured reserve. Returns the
    /// multiplier the round is admitted under.
    pub fn admit(&self, game_type: GameType, bet_amount: u64, vault_balance: u64) -> Result<u64> {
        let multiplier = self.config.payout_policy.multiplier(game_type);
        let max_payout = bet_amount
            .checked_mul(multiplier)
            .ok_or(FlipError::Overflow)?;
        let required = max_payout
            .checked_add(self.config.min_vault_balance)
            .ok_or(FlipError::Overflow)?;
        if vault_balance < required {
            msg!(
                "house vault cannot cover bet, need {}, have {}",
                required,
                vault_balance
            );
            return err!(FlipError::InsufficientVaultBalance);
        }
        Ok(multiplier)
    }

    pub fn totals_after(
        &self,
        bet_amount: u64,
        payout: u64,
        user_won: bool,
    ) -> Result<HouseTotals> {
        let collected = if user_won { 0 } else { bet_amount };
        Ok(HouseTotals {
            total_rounds: self.total_rounds.checked_add(1).ok_or(FlipError::Overflow)?,
            total_volume: self
                .total_volume
                .checked_add(bet_amount)
                .ok_or(FlipError::Overflow)?,
            total_payout: self
                .total_payout
                .checked_add(payout)
                .ok_or(FlipError::Overflow)?,
            total_collected: self
                .total_collected
                .checked_add(collected)
                .ok_or(FlipError::Overflow)?,
        })
    }

    pub fn apply_totals(&mut self, totals: HouseTotals) {
        self.total_rounds = totals.total_rounds;
        self.total_volume = totals.total_volume;
        self.total_payout = totals.total_payout;
        self.total_collected = totals.total_collected;
    }

    pub fn reconfigure(
        &mut self,
        config: HouseConfig,
        oracle_binding: Pubkey,
        enclave_measurement: [u8; 32],
    ) -> Result<()> {
        config.validate()?;
        self.config = config;
        self.oracle_binding = oracle_binding;
        self.enclave_measurement = enclave_measurement;
        Ok(())
    }
}

// === User ===

#[account]
#[derive(InitSpace)]
pub struct UserState {
    pub owner: Pubkey,
    pub house: Pubkey,
    pub escrow: Pubkey,
    pub reward_address: Pubkey,
    /// Outstanding randomness request; default unless a round is requested.
    pub pending_request: Pubkey,
    pub current_round: Round,
    pub last_airdrop_slot: u64,
    pub airdrop_count: u32,
    pub total_wagered: u64,
    pub total_won: u64,
    pub wins: u64,
    pub losses: u64,
    pub reclaims: u64,
    pub bump: u8,
    pub escrow_bump: u8,
    pub history: RoundHistory,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BetRequest {
    pub game_type: GameType,
    pub guess: u8,
    pub bet_amount: u64,
}

/// Token balances observed when the bet instruction runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BetFunding {
    pub escrow_balance: u64,
    pub payer_token_balance: u64,
    pub vault_balance: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BetReceipt {
    pub round_id: u64,
    pub request: Pubkey,
    /// Tokens the payer has to move into escrow before the bet is covered.
    pub escrow_top_up: u64,
    pub fee: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Settlement {
    pub round_id: u64,
    pub user_won: bool,
    /// Paid from the vault to the reward address.
    pub payout: u64,
    /// Moved from escrow to the vault.
    pub escrow_change: u64,
    /// Released from the request to the delivering oracle.
    pub fee: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Reclaim {
    pub round_id: u64,
    pub request: Pubkey,
    pub elapsed_slots: u64,
}

impl UserState {
    /// Allocation for a user whose history ring holds `history_capacity`
    /// rounds. Out-of-range capacities are clamped here and rejected by
    /// `UserState::new`.
    pub fn space(history_capacity: u32) -> usize {
        let unused = MAX_HISTORY_CAPACITY.saturating_sub(history_capacity) as usize;
        8 + Self::INIT_SPACE - unused * HistoryEntry::INIT_SPACE
    }

    pub fn new(
        owner: Pubkey,
        house: Pubkey,
        escrow: Pubkey,
        reward_address: Pubkey,
        history_capacity: u32,
        bump: u8,
        escrow_bump: u8,
    ) -> Result<Self> {
        Ok(Self {
            owner,
            house,
            escrow,
            reward_address,
            pending_request: Pubkey::default(),
            current_round: Round::default(),
            last_airdrop_slot: 0,
            airdrop_count: 0,
            total_wagered: 0,
            total_won: 0,
            wins: 0,
            losses: 0,
            reclaims: 0,
            bump,
            escrow_bump,
            history: RoundHistory::with_capacity(history_capacity)?,
        })
    }

    /// Round id the next bet will use; also seeds its request account.
    pub fn next_round_id(&self) -> u64 {
        self.current_round.round_id.saturating_add(1)
    }

    pub fn has_pending_request(&self) -> bool {
        self.current_round.status == RoundStatus::Requested
    }

    /// Opens a new round and hands a randomness request to the bridge.
    ///
    /// Nothing is written unless every check passes and the bridge accepts
    /// the request. Escrow is not debited here; the returned receipt says how
    /// much the payer must add so that escrow covers the wager.
    pub fn place_bet<B: RandomnessBridge>(
        &mut self,
        user_key: Pubkey,
        house: &HouseState,
        bridge: &mut B,
        bet: &BetRequest,
        funding: &BetFunding,
        clock: &SlotClock,
    ) -> Result<BetReceipt> {
        require!(!self.has_pending_request(), FlipError::AlreadyRequested);
        require!(
            bet.game_type.is_valid_outcome(bet.guess),
            FlipError::InvalidGuess
        );
        require!(bet.bet_amount > 0, FlipError::InvalidBetAmount);
        require!(
            bet.bet_amount <= house.config.max_bet,
            FlipError::MaxBetExceeded
        );

        let escrow_top_up = bet.bet_amount.saturating_sub(funding.escrow_balance);
        if escrow_top_up > funding.payer_token_balance {
            msg!(
                "missing funds to play, need {}, have {}",
                escrow_top_up,
                funding.payer_token_balance
            );
            return err!(FlipError::InsufficientFunds);
        }
        let payout_multiplier = house.admit(bet.game_type, bet.bet_amount, funding.vault_balance)?;

        let round_id = self
            .current_round
            .round_id
            .checked_add(1)
            .ok_or(FlipError::Overflow)?;
        let total_wagered = self
            .total_wagered
            .checked_add(bet.bet_amount)
            .ok_or(FlipError::Overflow)?;

        let descriptor = CallbackDescriptor::for_settlement(
            user_key,
            self.house,
            self.escrow,
            self.reward_address,
            house.vault,
            round_id,
        );
        let fee = house.config.request_fee;
        let request = bridge.issue_request(&descriptor, fee, clock.slot)?;

        self.current_round = Round {
            round_id,
            game_type: bet.game_type,
            guess: bet.guess,
            bet_amount: bet.bet_amount,
            payout_multiplier,
            status: RoundStatus::Requested,
            result: 0,
            request_slot: clock.slot,
            request_timestamp: clock.unix_timestamp,
            settle_slot: 0,
            settle_timestamp: 0,
        };
        self.pending_request = request;
        self.total_wagered = total_wagered;

        Ok(BetReceipt {
            round_id,
            request,
            escrow_top_up,
            fee,
        })
    }

    /// Consumes a verified oracle callback and resolves the current round.
    pub fn settle<B: RandomnessBridge>(
        &mut self,
        house: &mut HouseState,
        bridge: &mut B,
        invocation: &CallbackInvocation,
        result: u8,
        vault_balance: u64,
        clock: &SlotClock,
    ) -> Result<Settlement> {
        require!(self.has_pending_request(), FlipError::NoActiveRequest);
        if invocation.request != self.pending_request {
            msg!(
                "callback names request {}, pending request is {}",
                invocation.request,
                self.pending_request
            );
            return err!(FlipError::StaleRequest);
        }
        require!(
            bridge.verify_callback_origin(invocation),
            FlipError::InvalidCallbackOrigin
        );

        let round = self.current_round;
        require!(
            round.game_type.is_valid_outcome(result),
            FlipError::InvalidResult
        );

        let user_won = round.guess == result;
        let (payout, escrow_change) = if user_won {
            let payout = round.winning_payout().ok_or(FlipError::Overflow)?;
            (payout, 0)
        } else {
            (0, round.bet_amount)
        };
        if payout > vault_balance {
            msg!(
                "house vault cannot pay out, need {}, have {}",
                payout,
                vault_balance
            );
            return err!(FlipError::InsufficientVaultBalance);
        }

        let total_won = self.total_won.checked_add(payout).ok_or(FlipError::Overflow)?;
        let (wins, losses) = if user_won {
            (self.wins.checked_add(1).ok_or(FlipError::Overflow)?, self.losses)
        } else {
            (self.wins, self.losses.checked_add(1).ok_or(FlipError::Overflow)?)
        };
        let totals = house.totals_after(round.bet_amount, payout, user_won)?;

        let fee = bridge.complete_request(clock.slot)?;

        self.current_round.result = result;
        self.current_round.status = RoundStatus::Settled;
        self.current_round.settle_slot = clock.slot;
        self.current_round.settle_timestamp = clock.unix_timestamp;
        self.pending_request = Pubkey::default();
        self.history
            .push(HistoryEntry::settled(&self.current_round, payout));
        self.total_won = total_won;
        self.wins = wins;
        self.losses = losses;
        house.apply_totals(totals);

        Ok(Settlement {
            round_id: round.round_id,
            user_won,
            payout,
            escrow_change,
            fee,
        })
    }

    /// Abandons a request the oracle never answered. The wager stays in
    /// escrow; the request's fee is forfeited.
    pub fn reclaim(&mut self, config: &HouseConfig, clock: &SlotClock) -> Result<Reclaim> {
        require!(self.has_pending_request(), FlipError::NoActiveRequest);

        let elapsed_slots = clock.slot.saturating_sub(self.current_round.request_slot);
        if elapsed_slots <= config.request_timeout_slots {
            msg!(
                "request still live, {} of {} slots elapsed",
                elapsed_slots,
                config.request_timeout_slots
            );
            return err!(FlipError::RequestNotExpired);
        }
        let reclaims = self.reclaims.checked_add(1).ok_or(FlipError::Overflow)?;

        let request = self.pending_request;
        self.current_round.status = RoundStatus::Idle;
        self.current_round.result = 0;
        self.pending_request = Pubkey::default();
        self.reclaims = reclaims;

        Ok(Reclaim {
            round_id: self.current_round.round_id,
            request,
            elapsed_slots,
        })
    }

    /// Returns how much the vault should credit to escrow.
    pub fn airdrop(
        &mut self,
        config: &HouseConfig,
        escrow_balance: u64,
        vault_balance: u64,
        clock: &SlotClock,
    ) -> Result<u64> {
        let amount = if self.airdrop_count == 0 {
            config.initial_airdrop_amount
        } else {
            let next_allowed = self
                .last_airdrop_slot
                .saturating_add(config.airdrop_cooldown_slots);
            if clock.slot < next_allowed {
                msg!("next airdrop available at slot {}", next_allowed);
                return err!(FlipError::AirdropRequestedTooSoon);
            }
            require!(
                escrow_balance <= config.airdrop_amount,
                FlipError::EscrowBalanceHealthy
            );
            config.airdrop_amount
        };
        require!(amount > 0, FlipError::InvalidAmount);
        let required = amount
            .checked_add(config.min_vault_balance)
            .ok_or(FlipError::Overflow)?;
        if vault_balance < required {
            msg!(
                "house vault cannot fund airdrop, need {}, have {}",
                required,
                vault_balance
            );
            return err!(FlipError::InsufficientVaultBalance);
        }
        let airdrop_count = self
            .airdrop_count
            .checked_add(1)
            .ok_or(FlipError::Overflow)?;

        self.last_airdrop_slot = clock.slot;
        self.airdrop_count = airdrop_count;
        Ok(amount)
    }

    pub fn check_withdrawal(&self, amount: u64, escrow_balance: u64) -> Result<()> {
        require!(!self.has_pending_request(), FlipError::RoundInProgress);
        require!(amount > 0, FlipError::InvalidAmount);
        if amount > escrow_balance {
            msg!(
                "escrow cannot cover withdrawal, need {}, have {}",
                amount,
                escrow_balance
            );
            return err!(FlipError::InsufficientFunds);
        }
        Ok(())
    }
}
