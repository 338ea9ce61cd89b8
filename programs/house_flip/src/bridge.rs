//! Request/response bridge to the randomness oracle.
//!
//! A bet writes a `RandomnessRequest` account describing the settle
//! instruction the oracle must call back into. The oracle answers by
//! signing `user_settle` with the key the house is bound to; the request
//! pins that key, the enclave measurement and a digest of the callback
//! accounts at issue time so a later callback can be checked against all
//! three.

use anchor_lang::prelude::*;
use solana_hash::Hash;
use solana_sha256_hasher::{hash, hashv};

use crate::state::HouseState;
use crate::FlipError;

/// Preimage of the settle instruction discriminator.
pub const SETTLE_ENTRYPOINT_PREIMAGE: &[u8] = b"global:user_settle";

pub fn settle_entrypoint() -> [u8; 8] {
    let digest = hash(SETTLE_ENTRYPOINT_PREIMAGE).to_bytes();
    let mut entrypoint = [0u8; 8];
    entrypoint.copy_from_slice(&digest[..8]);
    entrypoint
}

/// The instruction the oracle must invoke, and the accounts it must pass.
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, Default, PartialEq, Eq, InitSpace)]
pub struct CallbackDescriptor {
    pub program_id: Pubkey,
    pub entrypoint: [u8; 8],
    pub user: Pubkey,
    pub house: Pubkey,
    pub escrow: Pubkey,
    pub reward_address: Pubkey,
    pub vault: Pubkey,
    pub round_id: u64,
}

impl CallbackDescriptor {
    pub fn for_settlement(
        user: Pubkey,
        house: Pubkey,
        escrow: Pubkey,
        reward_address: Pubkey,
        vault: Pubkey,
        round_id: u64,
    ) -> Self {
        Self {
            program_id: crate::ID,
            entrypoint: settle_entrypoint(),
            user,
            house,
            escrow,
            reward_address,
            vault,
            round_id,
        }
    }

    pub fn digest(&self) -> Hash {
        hashv(&[
            self.program_id.as_ref(),
            &self.entrypoint,
            self.user.as_ref(),
            self.house.as_ref(),
            self.escrow.as_ref(),
            self.reward_address.as_ref(),
            self.vault.as_ref(),
            &self.round_id.to_le_bytes(),
        ])
    }
}

/// What the settle instruction observed about the call it is serving.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CallbackInvocation {
    pub request: Pubkey,
    pub signer: Pubkey,
    pub signed: bool,
    pub descriptor: CallbackDescriptor,
}

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, Default, PartialEq, Eq, InitSpace)]
pub enum RequestStatus {
    #[default]
    Pending,
    Fulfilled,
}

#[account]
#[derive(InitSpace, Default)]
pub struct RandomnessRequest {
    pub user: Pubkey,
    pub house: Pubkey,
    pub round_id: u64,
    /// Oracle key bound to the house when the request was issued.
    pub oracle: Pubkey,
    pub enclave_measurement: [u8; 32],
    pub callback: CallbackDescriptor,
    pub callback_digest: [u8; 32],
    /// Funded the account; receives its rent back when the round settles.
    pub payer: Pubkey,
    /// Lamports escrowed in this account for the answering oracle.
    pub fee: u64,
    pub status: RequestStatus,
    pub request_slot: u64,
    pub fulfilled_slot: u64,
    pub bump: u8,
}

/// Seam between the settlement state machine and whatever produces
/// randomness for it.
pub trait RandomnessBridge {
    /// Registers a request for `descriptor` and returns its identifier.
    fn issue_request(
        &mut self,
        descriptor: &CallbackDescriptor,
        fee_budget: u64,
        slot: u64,
    ) -> Result<Pubkey>;

    /// True only for a callback from the oracle the request was issued to,
    /// running the attested enclave, naming the accounts the request was
    /// issued for.
    fn verify_callback_origin(&self, invocation: &CallbackInvocation) -> bool;

    /// Marks the request answered and returns the fee owed to the oracle.
    fn complete_request(&mut self, slot: u64) -> Result<u64>;
}

/// Bridge backed by a `RandomnessRequest` account and the oracle binding
/// stored on the house.
pub struct AttestedOracleBridge<'a> {
    request_key: Pubkey,
    request: &'a mut RandomnessRequest,
    oracle_binding: Pubkey,
    enclave_measurement: [u8; 32],
    fee_payer: Pubkey,
    fee_payer_lamports: u64,
    bump: u8,
}

impl<'a> AttestedOracleBridge<'a> {
    pub fn new(
        request_key: Pubkey,
        request: &'a mut RandomnessRequest,
        house: &HouseState,
    ) -> Self {
        Self {
            request_key,
            request,
            oracle_binding: house.oracle_binding,
            enclave_measurement: house.enclave_measurement,
            fee_payer: Pubkey::default(),
            fee_payer_lamports: 0,
            bump: 0,
        }
    }

    /// Needed only for issuing: who funds the request account, the balance
    /// the request fee is drawn from and the bump of the request account.
    pub fn with_fee_payer(mut self, payer: Pubkey, lamports: u64, bump: u8) -> Self {
        self.fee_payer = payer;
        self.fee_payer_lamports = lamports;
        self.bump = bump;
        self
    }
}

impl RandomnessBridge for AttestedOracleBridge<'_> {
    fn issue_request(
        &mut self,
        descriptor: &CallbackDescriptor,
        fee_budget: u64,
        slot: u64,
    ) -> Result<Pubkey> {
        require!(
            self.oracle_binding != Pubkey::default(),
            FlipError::OracleBindingMisconfigured
        );
        if self.fee_payer_lamports < fee_budget {
            msg!(
                "cannot fund randomness request, need {} lamports, have {}",
                fee_budget,
                self.fee_payer_lamports
            );
            return err!(FlipError::InsufficientFeeBalance);
        }

        let request = &mut *self.request;
        request.user = descriptor.user;
        request.house = descriptor.house;
        request.round_id = descriptor.round_id;
        request.oracle = self.oracle_binding;
        request.enclave_measurement = self.enclave_measurement;
        request.callback = *descriptor;
        request.callback_digest = descriptor.digest().to_bytes();
        request.payer = self.fee_payer;
        request.fee = fee_budget;
        request.status = RequestStatus::Pending;
        request.request_slot = slot;
        request.fulfilled_slot = 0;
        request.bump = self.bump;

        Ok(self.request_key)
    }

    fn verify_callback_origin(&self, invocation: &CallbackInvocation) -> bool {
        let request = &*self.request;
        if invocation.request != self.request_key || request.status != RequestStatus::Pending {
            msg!("callback does not match a pending request");
            return false;
        }
        if !invocation.signed || invocation.signer != request.oracle {
            msg!("callback not signed by request oracle {}", request.oracle);
            return false;
        }
        if request.oracle != self.oracle_binding {
            msg!("house oracle binding changed since request was issued");
            return false;
        }
        if request.enclave_measurement != self.enclave_measurement {
            msg!("enclave measurement changed since request was issued");
            return false;
        }
        if invocation.descriptor.digest().to_bytes() != request.callback_digest {
            msg!("callback accounts do not match request {}", self.request_key);
            return false;
        }
        true
    }

    fn complete_request(&mut self, slot: u64) -> Result<u64> {
        require!(
            self.request.status == RequestStatus::Pending,
            FlipError::NoActiveRequest
        );
        self.request.status = RequestStatus::Fulfilled;
        self.request.fulfilled_slot = slot;
        Ok(self.request.fee)
    }
}

#[cfg(test)]
mod tests {
    use anchor_lang::Discriminator;

    use super::*;
    use crate::state::HouseConfig;

    fn house(oracle: Pubkey) -> HouseState {
        HouseState {
            authority: Pubkey::new_unique(),
            mint: Pubkey::new_unique(),
            vault: Pubkey::new_unique(),
            oracle_binding: oracle,
            enclave_measurement: [3u8; 32],
            config: HouseConfig::default(),
            total_rounds: 0,
            total_volume: 0,
            total_payout: 0,
            total_collected: 0,
            bump: 255,
        }
    }

    fn descriptor(round_id: u64) -> CallbackDescriptor {
        CallbackDescriptor::for_settlement(
            Pubkey::new_unique(),
            Pubkey::new_unique(),
            Pubkey::new_unique(),
            Pubkey::new_unique(),
            Pubkey::new_unique(),
            round_id,
        )
    }

    #[test]
    fn test_entrypoint_matches_settle_discriminator() {
        assert_eq!(
            &settle_entrypoint()[..],
            crate::instruction::UserSettle::DISCRIMINATOR
        );
    }

    #[test]
    fn test_digest_binds_every_account() {
        let base = descriptor(4);
        let mut moved = base;
        moved.vault = Pubkey::new_unique();
        let mut replayed = base;
        replayed.round_id = 3;

        assert_eq!(base.digest(), base.digest());
        assert_ne!(base.digest(), moved.digest());
        assert_ne!(base.digest(), replayed.digest());
    }

    #[test]
    fn test_issue_pins_oracle_and_measurement() {
        let oracle = Pubkey::new_unique();
        let house = house(oracle);
        let key = Pubkey::new_unique();
        let mut request = RandomnessRequest::default();
        let descriptor = descriptor(1);
        let payer = Pubkey::new_unique();

        let issued = AttestedOracleBridge::new(key, &mut request, &house)
            .with_fee_payer(payer, 10_000, 251)
            .issue_request(&descriptor, 5_000, 12)
            .unwrap();

        assert_eq!(issued, key);
        assert_eq!(request.oracle, oracle);
        assert_eq!(request.enclave_measurement, [3u8; 32]);
        assert_eq!(request.callback, descriptor);
        assert_eq!(request.callback_digest, descriptor.digest().to_bytes());
        assert_eq!(request.payer, payer);
        assert_eq!(request.fee, 5_000);
        assert_eq!(request.bump, 251);
        assert_eq!(request.request_slot, 12);
        assert_eq!(request.status, RequestStatus::Pending);
    }

    #[test]
    fn test_issue_requires_fee_balance() {
        let house = house(Pubkey::new_unique());
        let mut request = RandomnessRequest::default();
        let result = AttestedOracleBridge::new(Pubkey::new_unique(), &mut request, &house)
            .with_fee_payer(Pubkey::new_unique(), 4_999, 1)
            .issue_request(&descriptor(1), 5_000, 12);
        assert_eq!(result.unwrap_err(), error!(FlipError::InsufficientFeeBalance));
        assert_eq!(request.fee, 0);
        assert_eq!(request.payer, Pubkey::default());
    }

    #[test]
    fn test_verify_and_complete() {
        let oracle = Pubkey::new_unique();
        let house = house(oracle);
        let key = Pubkey::new_unique();
        let mut request = RandomnessRequest::default();
        let descriptor = descriptor(9);
        let mut bridge = AttestedOracleBridge::new(key, &mut request, &house)
            .with_fee_payer(Pubkey::new_unique(), u64::MAX, 0);
        bridge.issue_request(&descriptor, 42, 70).unwrap();

        let invocation = CallbackInvocation {
            request: key,
            signer: oracle,
            signed: true,
            descriptor,
        };
        assert!(bridge.verify_callback_origin(&invocation));
        assert!(!bridge.verify_callback_origin(&CallbackInvocation {
            request: Pubkey::new_unique(),
            ..invocation
        }));

        assert_eq!(bridge.complete_request(77).unwrap(), 42);
        assert!(!bridge.verify_callback_origin(&invocation));
        assert!(bridge.complete_request(78).is_err());
        assert_eq!(request.fulfilled_slot, 77);
        assert_eq!(request.status, RequestStatus::Fulfilled);
    }

    #[test]
    fn test_rebinding_oracle_invalidates_request() {
        let oracle = Pubkey::new_unique();
        let mut house = house(oracle);
        let key = Pubkey::new_unique();
        let mut request = RandomnessRequest::default();
        let descriptor = descriptor(2);
        AttestedOracleBridge::new(key, &mut request, &house)
            .with_fee_payer(Pubkey::new_unique(), 100, 0)
            .issue_request(&descriptor, 0, 1)
            .unwrap();

        house.oracle_binding = Pubkey::new_unique();
        let bridge = AttestedOracleBridge::new(key, &mut request, &house);
        assert!(!bridge.verify_callback_origin(&CallbackInvocation {
            request: key,
            signer: oracle,
            signed: true,
            descriptor,
        }));
    }
}
