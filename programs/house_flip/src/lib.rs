use anchor_lang::prelude::*;
use anchor_lang::system_program;
use anchor_spl::associated_token::AssociatedToken;
use anchor_spl::token::{self, Mint, Token, TokenAccount, TransferChecked};

pub mod bridge;
pub mod cpi_helpers;
pub mod state;

use bridge::*;
use state::*;

declare_id!("F1iPj5HqzV9sBqkUo2kUXr6cVx3rWqHVbXyN2Jk6oRCs");

pub const HOUSE_SEED: &[u8] = b"house";
pub const USER_SEED: &[u8] = b"user";
pub const ESCROW_SEED: &[u8] = b"escrow";
pub const REQUEST_SEED: &[u8] = b"request";

/// House Flip
/// Wagers between a token vault and individual players, settled by an
/// attested randomness oracle calling back into `user_settle`.

#[program]
pub mod house_flip {
    use super::*;

    /// Create the house ledger and its vault for an existing wager mint
    pub fn house_init(
        ctx: Context<HouseInit>,
        config: HouseConfig,
        oracle_binding: Pubkey,
        enclave_measurement: [u8; 32],
    ) -> Result<()> {
        config.validate()?;

        let house = &mut ctx.accounts.house;
        house.set_inner(HouseState {
            authority: ctx.accounts.authority.key(),
            mint: ctx.accounts.mint.key(),
            vault: ctx.accounts.vault.key(),
            oracle_binding,
            enclave_measurement,
            config,
            total_rounds: 0,
            total_volume: 0,
            total_payout: 0,
            total_collected: 0,
            bump: ctx.bumps.house,
        });
        if !house.is_oracle_configured() {
            msg!("house created without an oracle binding, bets are disabled");
        }

        emit!(HouseInitialized {
            house: house.key(),
            authority: house.authority,
            mint: house.mint,
            vault: house.vault,
            oracle_binding,
            config,
        });

        Ok(())
    }

    /// Replace the house configuration and oracle binding
    pub fn house_configure(
        ctx: Context<HouseConfigure>,
        config: HouseConfig,
        oracle_binding: Pubkey,
        enclave_measurement: [u8; 32],
    ) -> Result<()> {
        let house = &mut ctx.accounts.house;
        house.reconfigure(config, oracle_binding, enclave_measurement)?;

        emit!(HouseConfigured {
            house: house.key(),
            oracle_binding,
            enclave_measurement,
            config,
        });

        Ok(())
    }

    /// Move wager tokens from the authority into the vault
    pub fn house_fund(ctx: Context<HouseFund>, amount: u64) -> Result<()> {
        require!(amount > 0, FlipError::InvalidAmount);

        transfer_tokens(
            &ctx.accounts.token_program,
            &ctx.accounts.funder_token,
            &ctx.accounts.vault,
            &ctx.accounts.mint,
            ctx.accounts.authority.to_account_info(),
            &[],
            amount,
        )?;

        emit!(HouseFunded {
            house: ctx.accounts.house.key(),
            amount,
            vault_balance: ctx
                .accounts
                .vault
                .amount
                .checked_add(amount)
                .ok_or(FlipError::Overflow)?,
        });

        Ok(())
    }

    /// Create a player's account, escrow and reward address
    pub fn user_init(ctx: Context<UserInit>, history_capacity: u32) -> Result<()> {
        let user = UserState::new(
            ctx.accounts.owner.key(),
            ctx.accounts.house.key(),
            ctx.accounts.escrow.key(),
            ctx.accounts.reward_address.key(),
            history_capacity,
            ctx.bumps.user,
            ctx.bumps.escrow,
        )?;
        ctx.accounts.user.set_inner(user);

        emit!(UserInitialized {
            user: ctx.accounts.user.key(),
            owner: ctx.accounts.owner.key(),
            escrow: ctx.accounts.escrow.key(),
            reward_address: ctx.accounts.reward_address.key(),
            history_capacity,
        });

        Ok(())
    }

    /// Open a round and request randomness for it
    pub fn user_bet(
        mut ctx: Context<UserBet>,
        game_type: GameType,
        guess: u8,
        bet_amount: u64,
    ) -> Result<()> {
        let clock = SlotClock::from(&Clock::get()?);
        let request_bump = ctx.bumps.request;
        let accounts = &mut ctx.accounts;

        let user_key = accounts.user.key();
        let request_key = accounts.request.key();
        let funding = BetFunding {
            escrow_balance: accounts.escrow.amount,
            payer_token_balance: accounts
                .payer_token
                .as_ref()
                .map_or(0, |payer_token| payer_token.amount),
            vault_balance: accounts.vault.amount,
        };
        let fee_payer = accounts.payer.key();
        let fee_payer_lamports = accounts.payer.lamports();

        let mut bridge =
            AttestedOracleBridge::new(request_key, &mut accounts.request, &accounts.house)
                .with_fee_payer(fee_payer, fee_payer_lamports, request_bump);
        let receipt = accounts.user.place_bet(
            user_key,
            &accounts.house,
            &mut bridge,
            &BetRequest {
                game_type,
                guess,
                bet_amount,
            },
            &funding,
            &clock,
        )?;

        if receipt.escrow_top_up > 0 {
            let payer_token = accounts
                .payer_token
                .as_ref()
                .ok_or(FlipError::InsufficientFunds)?;
            msg!("topping up escrow with {} tokens", receipt.escrow_top_up);
            transfer_tokens(
                &accounts.token_program,
                payer_token,
                &accounts.escrow,
                &accounts.mint,
                accounts.payer.to_account_info(),
                &[],
                receipt.escrow_top_up,
            )?;
        }

        if receipt.fee > 0 {
            let cpi_context = CpiContext::new(
                accounts.system_program.to_account_info(),
                system_program::Transfer {
                    from: accounts.payer.to_account_info(),
                    to: accounts.request.to_account_info(),
                },
            );
            system_program::transfer(cpi_context, receipt.fee)?;
        }

        emit!(RandomnessRequested {
            request: receipt.request,
            user: user_key,
            round_id: receipt.round_id,
            oracle: accounts.house.oracle_binding,
            fee: receipt.fee,
            slot: clock.slot,
        });
        emit!(BetPlaced {
            round_id: receipt.round_id,
            user: user_key,
            game_type,
            bet_amount,
            guess,
            slot: clock.slot,
            timestamp: clock.unix_timestamp,
        });

        Ok(())
    }

    /// Oracle callback carrying the random result for the pending round
    pub fn user_settle(mut ctx: Context<UserSettle>, result: u8) -> Result<()> {
        let clock = SlotClock::from(&Clock::get()?);
        let accounts = &mut ctx.accounts;

        let user_key = accounts.user.key();
        let request_key = accounts.request.key();
        let invocation = CallbackInvocation {
            request: request_key,
            signer: accounts.enclave_signer.key(),
            signed: accounts.enclave_signer.to_account_info().is_signer,
            descriptor: CallbackDescriptor::for_settlement(
                user_key,
                accounts.house.key(),
                accounts.escrow.key(),
                accounts.reward_address.key(),
                accounts.vault.key(),
                accounts.user.current_round.round_id,
            ),
        };
        let vault_balance = accounts.vault.amount;

        let mut bridge =
            AttestedOracleBridge::new(request_key, &mut accounts.request, &accounts.house);
        let settlement = accounts.user.settle(
            &mut accounts.house,
            &mut bridge,
            &invocation,
            result,
            vault_balance,
            &clock,
        )?;

        let house_seeds: &[&[u8]] = &[HOUSE_SEED, &[accounts.house.bump]];
        if settlement.user_won {
            transfer_tokens(
                &accounts.token_program,
                &accounts.vault,
                &accounts.reward_address,
                &accounts.mint,
                accounts.house.to_account_info(),
                &[house_seeds],
                settlement.payout,
            )?;
        } else {
            transfer_tokens(
                &accounts.token_program,
                &accounts.escrow,
                &accounts.vault,
                &accounts.mint,
                accounts.house.to_account_info(),
                &[house_seeds],
                settlement.escrow_change,
            )?;
        }

        if settlement.fee > 0 {
            release_lamports(
                &accounts.request.to_account_info(),
                &accounts.enclave_signer.to_account_info(),
                settlement.fee,
            )?;
        }

        let round = accounts.user.current_round;
        emit!(BetSettled {
            round_id: settlement.round_id,
            user: user_key,
            user_won: settlement.user_won,
            game_type: round.game_type,
            bet_amount: round.bet_amount,
            escrow_change: settlement.escrow_change,
            payout: settlement.payout,
            guess: round.guess,
            result,
            slot: clock.slot,
            timestamp: clock.unix_timestamp,
        });

        Ok(())
    }

    /// Abandon a request the oracle never answered
    pub fn user_reclaim(ctx: Context<UserReclaim>) -> Result<()> {
        let clock = SlotClock::from(&Clock::get()?);
        let config = ctx.accounts.house.config;
        let reclaim = ctx.accounts.user.reclaim(&config, &clock)?;

        emit!(BetReclaimed {
            round_id: reclaim.round_id,
            user: ctx.accounts.user.key(),
            request: reclaim.request,
            elapsed_slots: reclaim.elapsed_slots,
            slot: clock.slot,
            timestamp: clock.unix_timestamp,
        });

        Ok(())
    }

    /// Credit the player's escrow from the vault
    pub fn user_airdrop(ctx: Context<UserAirdrop>) -> Result<()> {
        let clock = SlotClock::from(&Clock::get()?);
        let config = ctx.accounts.house.config;
        let amount = ctx.accounts.user.airdrop(
            &config,
            ctx.accounts.escrow.amount,
            ctx.accounts.vault.amount,
            &clock,
        )?;

        let house_seeds: &[&[u8]] = &[HOUSE_SEED, &[ctx.accounts.house.bump]];
        transfer_tokens(
            &ctx.accounts.token_program,
            &ctx.accounts.vault,
            &ctx.accounts.escrow,
            &ctx.accounts.mint,
            ctx.accounts.house.to_account_info(),
            &[house_seeds],
            amount,
        )?;

        emit!(AirdropClaimed {
            user: ctx.accounts.user.key(),
            amount,
            airdrop_count: ctx.accounts.user.airdrop_count,
            slot: clock.slot,
        });

        Ok(())
    }

    /// Move idle escrow to the player's reward address
    pub fn user_withdraw(ctx: Context<UserWithdraw>, amount: u64) -> Result<()> {
        ctx.accounts
            .user
            .check_withdrawal(amount, ctx.accounts.escrow.amount)?;

        let house_seeds: &[&[u8]] = &[HOUSE_SEED, &[ctx.accounts.house.bump]];
        transfer_tokens(
            &ctx.accounts.token_program,
            &ctx.accounts.escrow,
            &ctx.accounts.reward_address,
            &ctx.accounts.mint,
            ctx.accounts.house.to_account_info(),
            &[house_seeds],
            amount,
        )?;

        emit!(EscrowWithdrawn {
            user: ctx.accounts.user.key(),
            amount,
        });

        Ok(())
    }
}

// === Helper Functions ===

fn transfer_tokens<'info>(
    token_program: &Program<'info, Token>,
    from: &Account<'info, TokenAccount>,
    to: &Account<'info, TokenAccount>,
    mint: &Account<'info, Mint>,
    authority: AccountInfo<'info>,
    signer_seeds: &[&[&[u8]]],
    amount: u64,
) -> Result<()> {
    let cpi_context = CpiContext::new_with_signer(
        token_program.to_account_info(),
        TransferChecked {
            from: from.to_account_info(),
            mint: mint.to_account_info(),
            to: to.to_account_info(),
            authority,
        },
        signer_seeds,
    );
    token::transfer_checked(cpi_context, amount, mint.decimals)
}

/// Moves lamports out of an account owned by this program.
fn release_lamports(from: &AccountInfo, to: &AccountInfo, amount: u64) -> Result<()> {
    let remaining = from
        .lamports()
        .checked_sub(amount)
        .ok_or(FlipError::InsufficientFeeBalance)?;
    let credited = to.lamports().checked_add(amount).ok_or(FlipError::Overflow)?;
    **from.try_borrow_mut_lamports()? = remaining;
    **to.try_borrow_mut_lamports()? = credited;
    Ok(())
}

// === Account Structures ===

#[derive(Accounts)]
pub struct HouseInit<'info> {
    #[account(
        init,
        payer = payer,
        space = 8 + HouseState::INIT_SPACE,
        seeds = [HOUSE_SEED],
        bump
    )]
    pub house: Account<'info, HouseState>,

    pub authority: Signer<'info>,
    pub mint: Account<'info, Mint>,

    #[account(
        init,
        payer = payer,
        associated_token::mint = mint,
        associated_token::authority = house
    )]
    pub vault: Account<'info, TokenAccount>,

    #[account(mut)]
    pub payer: Signer<'info>,
    pub system_program: Program<'info, System>,
    pub token_program: Program<'info, Token>,
    pub associated_token_program: Program<'info, AssociatedToken>,
}

#[derive(Accounts)]
pub struct HouseConfigure<'info> {
    #[account(
        mut,
        seeds = [HOUSE_SEED],
        bump = house.bump,
        has_one = authority @ FlipError::Unauthorized
    )]
    pub house: Account<'info, HouseState>,

    pub authority: Signer<'info>,
}

#[derive(Accounts)]
pub struct HouseFund<'info> {
    #[account(
        seeds = [HOUSE_SEED],
        bump = house.bump,
        has_one = authority @ FlipError::Unauthorized,
        has_one = mint,
        has_one = vault
    )]
    pub house: Account<'info, HouseState>,

    pub mint: Account<'info, Mint>,

    #[account(mut)]
    pub vault: Account<'info, TokenAccount>,

    #[account(mut, token::mint = mint, token::authority = authority)]
    pub funder_token: Account<'info, TokenAccount>,

    pub authority: Signer<'info>,
    pub token_program: Program<'info, Token>,
}

#[derive(Accounts)]
#[instruction(history_capacity: u32)]
pub struct UserInit<'info> {
    #[account(
        init,
        payer = payer,
        space = UserState::space(history_capacity),
        seeds = [USER_SEED, house.key().as_ref(), owner.key().as_ref()],
        bump
    )]
    pub user: Box<Account<'info, UserState>>,

    #[account(seeds = [HOUSE_SEED], bump = house.bump, has_one = mint)]
    pub house: Box<Account<'info, HouseState>>,

    pub mint: Box<Account<'info, Mint>>,

    #[account(
        init,
        payer = payer,
        seeds = [ESCROW_SEED, user.key().as_ref()],
        bump,
        token::mint = mint,
        token::authority = house
    )]
    pub escrow: Box<Account<'info, TokenAccount>>,

    #[account(
        init_if_needed,
        payer = payer,
        associated_token::mint = mint,
        associated_token::authority = owner
    )]
    pub reward_address: Box<Account<'info, TokenAccount>>,

    pub owner: Signer<'info>,

    #[account(mut)]
    pub payer: Signer<'info>,
    pub system_program: Program<'info, System>,
    pub token_program: Program<'info, Token>,
    pub associated_token_program: Program<'info, AssociatedToken>,
}

#[derive(Accounts)]
pub struct UserBet<'info> {
    #[account(
        mut,
        seeds = [USER_SEED, house.key().as_ref(), owner.key().as_ref()],
        bump = user.bump,
        has_one = owner @ FlipError::Unauthorized,
        has_one = house,
        has_one = escrow
    )]
    pub user: Box<Account<'info, UserState>>,

    #[account(seeds = [HOUSE_SEED], bump = house.bump, has_one = mint, has_one = vault)]
    pub house: Box<Account<'info, HouseState>>,

    pub mint: Box<Account<'info, Mint>>,

    pub vault: Box<Account<'info, TokenAccount>>,

    #[account(mut, seeds = [ESCROW_SEED, user.key().as_ref()], bump = user.escrow_bump)]
    pub escrow: Box<Account<'info, TokenAccount>>,

    #[account(
        init,
        payer = payer,
        space = 8 + RandomnessRequest::INIT_SPACE,
        seeds = [REQUEST_SEED, user.key().as_ref(), &user.next_round_id().to_le_bytes()],
        bump
    )]
    pub request: Box<Account<'info, RandomnessRequest>>,

    pub owner: Signer<'info>,

    #[account(mut)]
    pub payer: Signer<'info>,

    /// Only read when escrow is short of the wager.
    #[account(mut, token::mint = mint, token::authority = payer)]
    pub payer_token: Option<Box<Account<'info, TokenAccount>>>,

    pub system_program: Program<'info, System>,
    pub token_program: Program<'info, Token>,
}

/// Account order is what the oracle's callback builder emits; see
/// `cpi_helpers::settle_instruction`.
#[derive(Accounts)]
pub struct UserSettle<'info> {
    #[account(
        mut,
        seeds = [USER_SEED, house.key().as_ref(), user.owner.as_ref()],
        bump = user.bump,
        has_one = house,
        has_one = escrow,
        has_one = reward_address
    )]
    pub user: Box<Account<'info, UserState>>,

    #[account(mut, seeds = [HOUSE_SEED], bump = house.bump, has_one = mint, has_one = vault)]
    pub house: Box<Account<'info, HouseState>>,

    pub mint: Box<Account<'info, Mint>>,

    #[account(mut, seeds = [ESCROW_SEED, user.key().as_ref()], bump = user.escrow_bump)]
    pub escrow: Box<Account<'info, TokenAccount>>,

    #[account(mut)]
    pub reward_address: Box<Account<'info, TokenAccount>>,

    #[account(mut)]
    pub vault: Box<Account<'info, TokenAccount>>,

    /// Closed once the round settles; the fee has already gone to the oracle
    /// by then, so only the rent is returned.
    #[account(mut, has_one = payer @ FlipError::InvalidCallbackOrigin, close = payer)]
    pub request: Box<Account<'info, RandomnessRequest>>,

    #[account(mut)]
    pub enclave_signer: Signer<'info>,

    /// CHECK: rent refund target, must match the payer recorded on the request
    #[account(mut)]
    pub payer: UncheckedAccount<'info>,

    pub token_program: Program<'info, Token>,
}

#[derive(Accounts)]
pub struct UserReclaim<'info> {
    #[account(
        mut,
        seeds = [USER_SEED, house.key().as_ref(), owner.key().as_ref()],
        bump = user.bump,
        has_one = owner @ FlipError::Unauthorized,
        has_one = house
    )]
    pub user: Account<'info, UserState>,

    #[account(seeds = [HOUSE_SEED], bump = house.bump)]
    pub house: Account<'info, HouseState>,

    pub owner: Signer<'info>,
}

#[derive(Accounts)]
pub struct UserAirdrop<'info> {
    #[account(
        mut,
        seeds = [USER_SEED, house.key().as_ref(), owner.key().as_ref()],
        bump = user.bump,
        has_one = owner @ FlipError::Unauthorized,
        has_one = house,
        has_one = escrow
    )]
    pub user: Box<Account<'info, UserState>>,

    #[account(seeds = [HOUSE_SEED], bump = house.bump, has_one = mint, has_one = vault)]
    pub house: Box<Account<'info, HouseState>>,

    pub mint: Box<Account<'info, Mint>>,

    #[account(mut)]
    pub vault: Box<Account<'info, TokenAccount>>,

    #[account(mut, seeds = [ESCROW_SEED, user.key().as_ref()], bump = user.escrow_bump)]
    pub escrow: Box<Account<'info, TokenAccount>>,

    pub owner: Signer<'info>,
    pub token_program: Program<'info, Token>,
}

#[derive(Accounts)]
pub struct UserWithdraw<'info> {
    #[account(
        seeds = [USER_SEED, house.key().as_ref(), owner.key().as_ref()],
        bump = user.bump,
        has_one = owner @ FlipError::Unauthorized,
        has_one = house,
        has_one = escrow,
        has_one = reward_address
    )]
    pub user: Box<Account<'info, UserState>>,

    #[account(seeds = [HOUSE_SEED], bump = house.bump, has_one = mint)]
    pub house: Box<Account<'info, HouseState>>,

    pub mint: Box<Account<'info, Mint>>,

    #[account(mut, seeds = [ESCROW_SEED, user.key().as_ref()], bump = user.escrow_bump)]
    pub escrow: Box<Account<'info, TokenAccount>>,

    #[account(mut)]
    pub reward_address: Box<Account<'info, TokenAccount>>,

    pub owner: Signer<'info>,
    pub token_program: Program<'info, Token>,
}

// === Events ===

#[event]
pub struct HouseInitialized {
    pub house: Pubkey,
    pub authority: Pubkey,
    pub mint: Pubkey,
    pub vault: Pubkey,
    pub oracle_binding: Pubkey,
    pub config: HouseConfig,
}

#[event]
pub struct HouseConfigured {
    pub house: Pubkey,
    pub oracle_binding: Pubkey,
    pub enclave_measurement: [u8; 32],
    pub config: HouseConfig,
}

#[event]
pub struct HouseFunded {
    pub house: Pubkey,
    pub amount: u64,
    pub vault_balance: u64,
}

#[event]
pub struct UserInitialized {
    pub user: Pubkey,
    pub owner: Pubkey,
    pub escrow: Pubkey,
    pub reward_address: Pubkey,
    pub history_capacity: u32,
}

#[event]
pub struct RandomnessRequested {
    pub request: Pubkey,
    pub user: Pubkey,
    pub round_id: u64,
    pub oracle: Pubkey,
    pub fee: u64,
    pub slot: u64,
}

#[event]
pub struct BetPlaced {
    pub round_id: u64,
    pub user: Pubkey,
    pub game_type: GameType,
    pub bet_amount: u64,
    pub guess: u8,
    pub slot: u64,
    pub timestamp: i64,
}

#[event]
pub struct BetSettled {
    pub round_id: u64,
    pub user: Pubkey,
    pub user_won: bool,
    pub game_type: GameType,
    pub bet_amount: u64,
    pub escrow_change: u64,
    pub payout: u64,
    pub guess: u8,
    pub result: u8,
    pub slot: u64,
    pub timestamp: i64,
}

#[event]
pub struct BetReclaimed {
    pub round_id: u64,
    pub user: Pubkey,
    pub request: Pubkey,
    pub elapsed_slots: u64,
    pub slot: u64,
    pub timestamp: i64,
}

#[event]
pub struct AirdropClaimed {
    pub user: Pubkey,
    pub amount: u64,
    pub airdrop_count: u32,
    pub slot: u64,
}

#[event]
pub struct EscrowWithdrawn {
    pub user: Pubkey,
    pub amount: u64,
}

// === Errors ===

#[error_code]
#[derive(PartialEq, Eq)]
pub enum FlipError {
    #[msg("Guess is outside the game's range")]
    InvalidGuess,
    #[msg("Bet amount must be greater than zero")]
    InvalidBetAmount,
    #[msg("Bet exceeds the house maximum")]
    MaxBetExceeded,
    #[msg("Oracle result is outside the game's range")]
    InvalidResult,
    #[msg("History capacity must be between 1 and 200")]
    InvalidHistoryCapacity,
    #[msg("Invalid house configuration")]
    InvalidHouseConfig,
    #[msg("Invalid amount")]
    InvalidAmount,
    #[msg("A round is already awaiting randomness")]
    AlreadyRequested,
    #[msg("No round is awaiting randomness")]
    NoActiveRequest,
    #[msg("Escrow is locked while a round is in progress")]
    RoundInProgress,
    #[msg("Callback is for a request that is no longer pending")]
    StaleRequest,
    #[msg("Callback was not delivered by the bound oracle")]
    InvalidCallbackOrigin,
    #[msg("Signer is not authorized for this account")]
    Unauthorized,
    #[msg("Escrow and payer balance cannot cover the bet")]
    InsufficientFunds,
    #[msg("House vault cannot cover this amount")]
    InsufficientVaultBalance,
    #[msg("Payer cannot fund the randomness request fee")]
    InsufficientFeeBalance,
    #[msg("House has no oracle binding")]
    OracleBindingMisconfigured,
    #[msg("Airdrop requested too soon")]
    AirdropRequestedTooSoon,
    #[msg("Escrow balance is above the airdrop threshold")]
    EscrowBalanceHealthy,
    #[msg("Arithmetic overflow")]
    Overflow,
    #[msg("Request has not timed out yet")]
    RequestNotExpired,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Sequencing,
    Authenticity,
    Resource,
    Liveness,
}

impl ErrorCategory {
    /// Validation errors go away with different arguments. The rest need the
    /// account state to change first: a settlement, a reclaim, funding, or
    /// time passing.
    pub fn is_retryable_with_new_input(&self) -> bool {
        matches!(self, ErrorCategory::Validation)
    }
}

impl FlipError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            FlipError::InvalidGuess
            | FlipError::InvalidBetAmount
            | FlipError::MaxBetExceeded
            | FlipError::InvalidResult
            | FlipError::InvalidHistoryCapacity
            | FlipError::InvalidHouseConfig
            | FlipError::InvalidAmount => ErrorCategory::Validation,
            FlipError::AlreadyRequested
            | FlipError::NoActiveRequest
            | FlipError::RoundInProgress => ErrorCategory::Sequencing,
            FlipError::StaleRequest
            | FlipError::InvalidCallbackOrigin
            | FlipError::Unauthorized => ErrorCategory::Authenticity,
            FlipError::InsufficientFunds
            | FlipError::InsufficientVaultBalance
            | FlipError::InsufficientFeeBalance
            | FlipError::OracleBindingMisconfigured
            | FlipError::AirdropRequestedTooSoon
            | FlipError::EscrowBalanceHealthy
            | FlipError::Overflow => ErrorCategory::Resource,
            FlipError::RequestNotExpired => ErrorCategory::Liveness,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        assert_eq!(FlipError::InvalidGuess.category(), ErrorCategory::Validation);
        assert_eq!(FlipError::AlreadyRequested.category(), ErrorCategory::Sequencing);
        assert_eq!(FlipError::StaleRequest.category(), ErrorCategory::Authenticity);
        assert_eq!(FlipError::InvalidCallbackOrigin.category(), ErrorCategory::Authenticity);
        assert_eq!(FlipError::InsufficientVaultBalance.category(), ErrorCategory::Resource);
        assert_eq!(FlipError::RequestNotExpired.category(), ErrorCategory::Liveness);

        assert!(FlipError::MaxBetExceeded.category().is_retryable_with_new_input());
        assert!(!FlipError::NoActiveRequest.category().is_retryable_with_new_input());
        assert!(!FlipError::RequestNotExpired.category().is_retryable_with_new_input());
    }

    #[test]
    fn test_seeds_are_distinct() {
        let seeds = [HOUSE_SEED, USER_SEED, ESCROW_SEED, REQUEST_SEED];
        for (i, a) in seeds.iter().enumerate() {
            for b in &seeds[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_house_space_fits_layout() {
        let house = HouseState {
            authority: Pubkey::new_unique(),
            mint: Pubkey::new_unique(),
            vault: Pubkey::new_unique(),
            oracle_binding: Pubkey::new_unique(),
            enclave_measurement: [0u8; 32],
            config: HouseConfig::default(),
            total_rounds: 0,
            total_volume: 0,
            total_payout: 0,
            total_collected: 0,
            bump: 0,
        };
        let mut data = Vec::new();
        AnchorSerialize::serialize(&house, &mut data).unwrap();
        assert_eq!(data.len(), HouseState::INIT_SPACE);

        let mut data = Vec::new();
        AnchorSerialize::serialize(&RandomnessRequest::default(), &mut data).unwrap();
        assert_eq!(data.len(), RandomnessRequest::INIT_SPACE);
    }
}
