//! Token-transfer verifier
//!
//! Addresses are `token@wallet`. The transaction must call the token
//! contract with the configured transfer function, the payee wallet and the
//! amount, followed by the payment proof.

use anyhow::{Context, Result};
use chain_clients_common::{hex_addresses_equal, CompoundAddress};
use chain_clients_evm::{decode_call, EvmClient, FunctionSignature, Token};

use super::ethereum::{calldata, lookup_confirmed, validate_target, Lookup};
use super::{validate_proof_format, VerificationRequest, VerificationResult};
use crate::config::TokenChainConfig;

/// Token contract and both wallets of a token payment
pub(crate) struct TokenParties {
    pub token: String,
    pub payer: String,
    pub payee: String,
}

/// Splits compound request addresses, requiring one shared token contract.
pub(crate) fn token_parties(
    request: &VerificationRequest,
) -> std::result::Result<TokenParties, VerificationResult> {
    let (src, dst) = (CompoundAddress::parse(&request.src), CompoundAddress::parse(&request.dst));
    match (&src.contract, &dst.contract) {
        (Some(token), Some(_)) if src.same_contract(&dst) => Ok(TokenParties {
            token: token.clone(),
            payer: src.wallet,
            payee: dst.wallet,
        }),
        (Some(_), Some(_)) => Err(VerificationResult::rejected(
            "Payer and payee use different token contracts",
        )),
        _ => Err(VerificationResult::rejected(
            "Token addresses must have the form contract@wallet",
        )),
    }
}

pub struct Erc20Verifier {
    config: TokenChainConfig,
    client: EvmClient,
    signature: FunctionSignature,
}

impl Erc20Verifier {
    pub fn new(config: TokenChainConfig) -> Result<Self> {
        let client = EvmClient::new(&config.rpc_url)?;
        let signature = FunctionSignature::parse(&config.function_signature)
            .with_context(|| format!("Invalid function_signature for chain '{}'", config.name))?;
        Ok(Self {
            config,
            client,
            signature,
        })
    }

    pub async fn check(&self, request: &VerificationRequest) -> Result<VerificationResult> {
        if let Some(result) = validate_proof_format(request) {
            return Ok(result);
        }
        let parties = match token_parties(request) {
            Ok(parties) => parties,
            Err(result) => return Ok(result),
        };

        let tx = match lookup_confirmed(
            &self.client,
            request,
            self.config.confirmations,
            &parties.payer,
        )
        .await?
        {
            Lookup::Confirmed(tx) => tx,
            Lookup::Rejected(result) => return Ok(result),
        };

        if let Some(result) = validate_target(&tx, &parties.token, "token") {
            return Ok(result);
        }

        let decoded = match decode_call(&self.signature, &calldata(&tx)?) {
            Ok(decoded) => decoded,
            Err(e) => {
                return Ok(VerificationResult::rejected(format!(
                    "Transaction {} is not a valid {} call: {:#}",
                    tx.hash, self.signature.text, e
                )))
            }
        };

        match decoded.args.as_slice() {
            [Token::Address(to), Token::Uint(amount)] => {
                if !hex_addresses_equal(to, &parties.payee) {
                    return Ok(VerificationResult::rejected(format!(
                        "Token recipient {} does not match payee {}",
                        to, parties.payee
                    )));
                }
                if *amount != request.amount as u128 {
                    return Ok(VerificationResult::rejected(format!(
                        "Token amount {} does not match amount {}",
                        amount, request.amount
                    )));
                }
            }
            _ => {
                return Ok(VerificationResult::rejected(format!(
                    "Function {} does not take (address, amount)",
                    self.signature.text
                )))
            }
        }

        if request.proof_bytes().map(|p| p.to_vec()) != Some(decoded.trailing) {
            return Ok(VerificationResult::rejected(format!(
                "Transaction {} does not carry the payment proof",
                tx.hash
            )));
        }

        Ok(VerificationResult::accepted(format!(
            "Transaction {} transfers {} of token {} to {}",
            tx.hash, request.amount, parties.token, parties.payee
        )))
    }
}
