//! Gateway-forwarded token verifier
//!
//! The payer approves the gateway and the gateway's forwarding function moves
//! the tokens. Only the forwarding transaction is verified: it must call the
//! configured gateway with `(token, payee wallet, amount, proof)`.

use anyhow::{Context, Result};
use chain_clients_common::{hex_addresses_equal, strip_hex_prefix};
use chain_clients_evm::{decode_call, EvmClient, FunctionSignature, Token};

use super::erc20::token_parties;
use super::ethereum::{calldata, lookup_confirmed, validate_target, Lookup};
use super::{validate_proof_format, VerificationRequest, VerificationResult};
use crate::config::GatewayChainConfig;

pub struct GatewayVerifier {
    config: GatewayChainConfig,
    client: EvmClient,
    signature: FunctionSignature,
}

impl GatewayVerifier {
    pub fn new(config: GatewayChainConfig) -> Result<Self> {
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

        if let Some(result) = validate_target(&tx, &self.config.contract_address, "gateway") {
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

        let (token, to, amount, proof) = match decoded.args.as_slice() {
            [
                Token::Address(token),
                Token::Address(to),
                Token::Uint(amount),
                Token::Bytes32(proof),
            ] => (token, to, *amount, proof),
            _ => {
                return Ok(VerificationResult::rejected(format!(
                    "Function {} does not take (token, address, amount, proof)",
                    self.signature.text
                )))
            }
        };

        if !hex_addresses_equal(token, &parties.token) {
            return Ok(VerificationResult::rejected(format!(
                "Forwarded token {} does not match {}",
                token, parties.token
            )));
        }
        if !hex_addresses_equal(to, &parties.payee) {
            return Ok(VerificationResult::rejected(format!(
                "Forwarded recipient {} does not match payee {}",
                to, parties.payee
            )));
        }
        if amount != request.amount as u128 {
            return Ok(VerificationResult::rejected(format!(
                "Forwarded amount {} does not match amount {}",
                amount, request.amount
            )));
        }
        if *proof != strip_hex_prefix(&request.proof).to_lowercase() {
            return Ok(VerificationResult::rejected(format!(
                "Transaction {} does not carry the payment proof",
                tx.hash
            )));
        }

        Ok(VerificationResult::accepted(format!(
            "Transaction {} forwards {} of token {} to {}",
            tx.hash, amount, parties.token, parties.payee
        )))
    }
}
