//! Property-based tests over the ledger's apply/reverse pair. Grounded
//! in the teacher's own use of `proptest` as its property-testing tool;
//! generalized from the teacher's "any input" style checks to the
//! balance/nonce invariants this domain cares about (§8: balances never
//! go negative, apply-then-reverse is the identity).

use proptest::prelude::*;

use numi_core::primitives::Address;
use numi_core::state::Ledger;
use numi_core::transaction::{sign_transaction, Transaction};

fn keypair() -> (secp256k1::SecretKey, secp256k1::PublicKey) {
    let secp = secp256k1::Secp256k1::new();
    secp.generate_keypair(&mut rand::thread_rng())
}

proptest! {
    /// For any funded sender and any value within its balance, applying a
    /// transaction then reversing it restores the original balances and
    /// nonce for both parties.
    #[test]
    fn apply_then_reverse_is_the_identity(
        value in 0u64..10_000,
        starting_balance in 10_100u64..1_000_000,
        tx_time in 1u64..1_000_000,
    ) {
        let (sk, pk) = keypair();
        let from = Address::from_public_key(&pk);
        let to = Address::zero();

        let mut ledger = Ledger::default();
        ledger.credit(from, starting_balance);

        let tx = Transaction::new(from, to, value, 1, String::new(), tx_time);
        let signed = sign_transaction(tx, &sk);

        let before_from = ledger.balance(&from);
        let before_to = ledger.balance(&to);

        ledger.apply_tx(&signed).unwrap();
        prop_assert!(ledger.balance(&from) <= before_from);

        ledger.reverse_tx(&signed);
        prop_assert_eq!(ledger.balance(&from), before_from);
        prop_assert_eq!(ledger.balance(&to), before_to);
        prop_assert_eq!(ledger.next_nonce(&from), 0);
    }

    /// A transaction costing more than the sender's balance is always
    /// rejected, and rejection never mutates the ledger.
    #[test]
    fn overspend_is_always_rejected_without_mutation(
        starting_balance in 0u64..200,
        value in 10_000u64..1_000_000,
        tx_time in 1u64..1_000_000,
    ) {
        let (sk, pk) = keypair();
        let from = Address::from_public_key(&pk);

        let mut ledger = Ledger::default();
        ledger.credit(from, starting_balance);

        let tx = Transaction::new(from, Address::zero(), value, 1, String::new(), tx_time);
        let signed = sign_transaction(tx, &sk);

        let before = ledger.balance(&from);
        prop_assert!(ledger.apply_tx(&signed).is_err());
        prop_assert_eq!(ledger.balance(&from), before);
    }
}
