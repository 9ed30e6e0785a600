//! Transaction signing with an actor's secp256k1 keypair.
//!
//! Signing is a separate step from building because the keypair lives in
//! the encrypted key store and may not be available at construction time.
//! Attaching the public key changes the canonical payload, so signing
//! refreshes the hash before producing the signature. Afterwards the
//! stored hash, the signature, and the payload all agree.

use super::builder::Transaction;
use crate::crypto::ecdsa::ActorKeypair;

/// Signs a transaction in place.
///
/// The procedure:
/// 1. Embed the keypair's public key in `actor_public_key`.
/// 2. Recompute `hash` over the canonical payload (which now includes
///    the public key).
/// 3. ECDSA-sign the canonical payload and store the DER-hex signature.
///
/// The caller is responsible for the keypair actually belonging to
/// `tx.actor_user_id`; the engine does this by fetching it from the key
/// store under that id.
pub fn sign_transaction<'a>(tx: &'a mut Transaction, keypair: &ActorKeypair) -> &'a Transaction {
    tx.actor_public_key = Some(keypair.public_hex());
    tx.hash = tx.compute_hash();
    tx.actor_signature = Some(keypair.sign_hex(tx.canonical_payload().as_bytes()));
    tx
}
