//! Client helpers for House Flip
//!
//! PDA derivations for every account the program owns, the builder a client
//! uses to open a player account, and the builder an oracle function uses to
//! answer a randomness request.
//!
//! # Example
//!
//! ```ignore
//! use house_flip::cpi_helpers::settle_instruction;
//!
//! // Inside the oracle function, after reading the request account:
//! let ix = settle_instruction(&request, &request_key, &mint, &enclave_signer, result);
//! ```

use anchor_lang::prelude::*;
use anchor_lang::solana_program::instruction::Instruction;
use anchor_lang::{InstructionData, ToAccountMetas};
use anchor_spl::associated_token::get_associated_token_address;

use crate::bridge::RandomnessRequest;
use crate::state::DEFAULT_HISTORY_CAPACITY;
use crate::{ESCROW_SEED, HOUSE_SEED, REQUEST_SEED, USER_SEED};

/// Derive the house PDA address
pub fn derive_house_pda(program_id: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(&[HOUSE_SEED], program_id)
}

/// Derive the house vault, the house PDA's associated token account
pub fn derive_vault_address(house: &Pubkey, mint: &Pubkey) -> Pubkey {
    get_associated_token_address(house, mint)
}

/// Derive the user state PDA address
pub fn derive_user_pda(house: &Pubkey, owner: &Pubkey, program_id: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(&[USER_SEED, house.as_ref(), owner.as_ref()], program_id)
}

/// Derive the escrow token account PDA address
pub fn derive_escrow_pda(user: &Pubkey, program_id: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(&[ESCROW_SEED, user.as_ref()], program_id)
}

/// Derive the randomness request PDA address for a round
pub fn derive_request_pda(user: &Pubkey, round_id: u64, program_id: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(
        &[REQUEST_SEED, user.as_ref(), &round_id.to_le_bytes()],
        program_id,
    )
}

/// Build `user_init` for `owner` against the house of `mint`. The history
/// ring defaults to `DEFAULT_HISTORY_CAPACITY` rounds.
pub fn user_init_instruction(
    program_id: &Pubkey,
    mint: &Pubkey,
    owner: &Pubkey,
    payer: &Pubkey,
    history_capacity: Option<u32>,
) -> Instruction {
    let (house, _) = derive_house_pda(program_id);
    let (user, _) = derive_user_pda(&house, owner, program_id);
    let (escrow, _) = derive_escrow_pda(&user, program_id);
    let accounts = crate::accounts::UserInit {
        user,
        house,
        mint: *mint,
        escrow,
        reward_address: get_associated_token_address(owner, mint),
        owner: *owner,
        payer: *payer,
        system_program: anchor_lang::system_program::ID,
        token_program: anchor_spl::token::ID,
        associated_token_program: anchor_spl::associated_token::ID,
    };
    Instruction {
        program_id: *program_id,
        accounts: accounts.to_account_metas(None),
        data: crate::instruction::UserInit {
            history_capacity: history_capacity.unwrap_or(DEFAULT_HISTORY_CAPACITY),
        }
        .data(),
    }
}

/// Build the `user_settle` callback for a pending request. Accounts come
/// from the descriptor the request pinned, so the digest check passes only
/// if the request account itself is authentic. The request's rent goes back
/// to whoever paid for it.
pub fn settle_instruction(
    request: &RandomnessRequest,
    request_key: &Pubkey,
    mint: &Pubkey,
    enclave_signer: &Pubkey,
    result: u8,
) -> Instruction {
    let callback = &request.callback;
    let accounts = crate::accounts::UserSettle {
        user: callback.user,
        house: callback.house,
        mint: *mint,
        escrow: callback.escrow,
        reward_address: callback.reward_address,
        vault: callback.vault,
        request: *request_key,
        enclave_signer: *enclave_signer,
        payer: request.payer,
        token_program: anchor_spl::token::ID,
    };
    Instruction {
        program_id: callback.program_id,
        accounts: accounts.to_account_metas(None),
        data: crate::instruction::UserSettle { result }.data(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{
        settle_entrypoint, AttestedOracleBridge, CallbackDescriptor, RandomnessBridge,
    };
    use crate::state::{HouseConfig, HouseState};

    #[test]
    fn test_pdas_are_deterministic() {
        let (house, _) = derive_house_pda(&crate::ID);
        let owner = Pubkey::new_unique();
        let (user, _) = derive_user_pda(&house, &owner, &crate::ID);

        assert_eq!(derive_user_pda(&house, &owner, &crate::ID).0, user);
        assert_ne!(derive_escrow_pda(&user, &crate::ID).0, user);
        assert_ne!(
            derive_request_pda(&user, 1, &crate::ID).0,
            derive_request_pda(&user, 2, &crate::ID).0
        );
    }

    #[test]
    fn test_settle_instruction_layout() {
        let (house_key, _) = derive_house_pda(&crate::ID);
        let mint = Pubkey::new_unique();
        let oracle = Pubkey::new_unique();
        let house = HouseState {
            authority: Pubkey::new_unique(),
            mint,
            vault: derive_vault_address(&house_key, &mint),
            oracle_binding: oracle,
            enclave_measurement: [5u8; 32],
            config: HouseConfig::default(),
            total_rounds: 0,
            total_volume: 0,
            total_payout: 0,
            total_collected: 0,
            bump: 0,
        };
        let owner = Pubkey::new_unique();
        let (user, _) = derive_user_pda(&house_key, &owner, &crate::ID);
        let (escrow, _) = derive_escrow_pda(&user, &crate::ID);
        let reward_address = get_associated_token_address(&owner, &mint);
        let (request_key, bump) = derive_request_pda(&user, 1, &crate::ID);
        let payer = Pubkey::new_unique();

        let descriptor = CallbackDescriptor::for_settlement(
            user,
            house_key,
            escrow,
            reward_address,
            house.vault,
            1,
        );
        let mut request = RandomnessRequest::default();
        AttestedOracleBridge::new(request_key, &mut request, &house)
            .with_fee_payer(payer, 1_000_000, bump)
            .issue_request(&descriptor, 0, 10)
            .unwrap();

        let ix = settle_instruction(&request, &request_key, &mint, &oracle, 2);
        assert_eq!(ix.program_id, crate::ID);
        assert_eq!(&ix.data[..8], &settle_entrypoint()[..]);
        assert_eq!(ix.data[8], 2);

        let keys: Vec<Pubkey> = ix.accounts.iter().map(|meta| meta.pubkey).collect();
        assert_eq!(
            keys,
            vec![
                user,
                house_key,
                mint,
                escrow,
                reward_address,
                house.vault,
                request_key,
                oracle,
                payer,
                anchor_spl::token::ID
            ]
        );
        let signer = &ix.accounts[7];
        assert!(signer.is_signer);
        assert!(signer.is_writable);
        assert!(!ix.accounts[2].is_writable);
        assert!(ix.accounts[6].is_writable);
        assert!(ix.accounts[8].is_writable);
        assert!(!ix.accounts[8].is_signer);
    }

    #[test]
    fn test_user_init_defaults_history_capacity() {
        let mint = Pubkey::new_unique();
        let owner = Pubkey::new_unique();
        let payer = Pubkey::new_unique();
        let ix = user_init_instruction(&crate::ID, &mint, &owner, &payer, None);

        let (house, _) = derive_house_pda(&crate::ID);
        let (user, _) = derive_user_pda(&house, &owner, &crate::ID);
        assert_eq!(ix.accounts[0].pubkey, user);
        assert_eq!(ix.accounts[3].pubkey, derive_escrow_pda(&user, &crate::ID).0);
        assert_eq!(ix.accounts[4].pubkey, get_associated_token_address(&owner, &mint));
        assert_eq!(&ix.data[8..12], &DEFAULT_HISTORY_CAPACITY.to_le_bytes()[..]);

        let ix = user_init_instruction(&crate::ID, &mint, &owner, &payer, Some(3));
        assert_eq!(&ix.data[8..12], &3u32.to_le_bytes()[..]);
    }
}
