//! Integration tests for the TacoToken ledger.
//!
//! Mirrors the launch setup: full supply to the deployer, the reserve set,
//! and the circulating allocation parked in the reserve so crunches have
//! something to chew on.

use taconomics_contracts::error::ContractError;
use taconomics_contracts::taco_token::{LeaderboardOrder, TacoToken, TaqueroStat};
use taconomics_protocol::config::{CIRCULATING_SUPPLY, TOTAL_SUPPLY};
use taconomics_protocol::types::{Address, Timestamp};

/// Wednesday 2020-08-12 00:00:00 UTC.
const WEDNESDAY: Timestamp = 1_597_190_400;
/// Tuesday 2020-08-11 12:00:00 UTC.
const TUESDAY_NOON: Timestamp = 1_597_147_200;

fn addr(s: &str) -> Address {
    Address::new(s).unwrap()
}

fn deployer() -> Address {
    addr("deployer")
}

fn reserve() -> Address {
    addr("reserve")
}

/// Helper: the launch configuration at `now`, still paused.
fn launched(now: Timestamp) -> TacoToken {
    let mut token = TacoToken::new(deployer(), TOTAL_SUPPLY, now);
    token.set_reserve(&deployer(), reserve()).unwrap();
    token
        .transfer(&deployer(), &reserve(), CIRCULATING_SUPPLY)
        .unwrap();
    token
}

fn unpaused(now: Timestamp) -> TacoToken {
    let mut token = launched(now);
    token.unpause(&deployer(), now).unwrap();
    token
}

// ---------------------------------------------------------------------------
// Social proofs
// ---------------------------------------------------------------------------

#[test]
fn social_handles() {
    let token = launched(WEDNESDAY);
    let proofs = token.social_proofs();
    assert_eq!(proofs.twitter, "Taconomics101");
    assert_eq!(proofs.telegram, "TacoGram");
    assert_eq!(proofs.website, "taconomics.io");
    assert_eq!(proofs.github, "taconomics");
}

#[test]
fn owner_sets_proofs() {
    let mut token = launched(WEDNESDAY);
    assert_eq!(token.social_proofs().twitter_proof, 0);
    assert_eq!(token.social_proofs().github_proof, "0x");

    token.set_twitter_proof(&deployer(), 123_456_789).unwrap();
    token
        .set_github_proof(&deployer(), "0x05efaa4635fb28cb0de42e2a3d7c3529".into())
        .unwrap();
    assert_eq!(token.social_proofs().twitter_proof, 123_456_789);
    assert_eq!(
        token.social_proofs().github_proof,
        "0x05efaa4635fb28cb0de42e2a3d7c3529"
    );

    assert_eq!(
        token.set_twitter_proof(&addr("stranger"), 1),
        Err(ContractError::OwnerOnly)
    );
}

// ---------------------------------------------------------------------------
// Pausing
// ---------------------------------------------------------------------------

#[test]
fn deployer_is_pauser_and_token_starts_paused() {
    let token = launched(WEDNESDAY);
    assert!(token.is_paused());
    assert_eq!(token.pauser(), Some(&deployer()));
}

#[test]
fn paused_token_cannot_be_crunched() {
    let mut token = launched(WEDNESDAY);
    assert_eq!(
        token.crunch(&addr("taquero"), WEDNESDAY + 300),
        Err(ContractError::Paused)
    );
}

#[test]
fn delegated_pauser_can_move_tokens_and_unpause() {
    let mut token = launched(WEDNESDAY);
    token.transfer(&deployer(), &addr("alice"), 1_000).unwrap();
    token.set_pauser(&deployer(), addr("alice")).unwrap();

    token.transfer(&addr("alice"), &addr("bob"), 1_000).unwrap();
    assert_eq!(token.balance_of(&addr("bob")), 1_000);

    // Even the pauser cannot hand its role on.
    assert_eq!(
        token.set_pauser(&addr("alice"), deployer()),
        Err(ContractError::OwnerOnly)
    );

    token.unpause(&addr("alice"), WEDNESDAY).unwrap();
    assert!(!token.is_paused());
    assert_eq!(token.pauser(), None);
    assert_eq!(
        token.set_pauser(&deployer(), deployer()),
        Err(ContractError::PauserBurned)
    );
}

#[test]
fn non_pauser_is_frozen_while_paused() {
    let mut token = launched(WEDNESDAY);
    token.transfer(&deployer(), &addr("alice"), 100_000).unwrap();

    assert_eq!(
        token.transfer(&addr("alice"), &addr("bob"), 100_000),
        Err(ContractError::Paused)
    );
    assert_eq!(token.unpause(&addr("alice"), WEDNESDAY), Err(ContractError::PauserOnly));
    assert_eq!(
        token.set_pauser(&addr("alice"), addr("bob")),
        Err(ContractError::OwnerOnly)
    );
    assert_eq!(token.pauser(), Some(&deployer()));
}

#[test]
fn everyone_transfers_once_unpaused() {
    let mut token = unpaused(WEDNESDAY);
    token.transfer(&deployer(), &addr("alice"), 100_000).unwrap();
    token.transfer(&addr("alice"), &addr("bob"), 100_000).unwrap();
    assert_eq!(token.balance_of(&addr("bob")), 100_000);
    assert_eq!(token.balance_of(&addr("alice")), 0);
}

#[test]
fn overdrawn_transfer_changes_nothing() {
    let mut token = unpaused(WEDNESDAY);
    token.transfer(&deployer(), &addr("alice"), 10).unwrap();
    assert_eq!(
        token.transfer(&addr("alice"), &addr("bob"), 11),
        Err(ContractError::InsufficientBalance {
            balance: 10,
            amount: 11
        })
    );
    assert_eq!(token.balance_of(&addr("alice")), 10);
    assert_eq!(token.balance_of(&addr("bob")), 0);
}

// ---------------------------------------------------------------------------
// Owner setters
// ---------------------------------------------------------------------------

#[test]
fn reserve_is_set_once_by_the_owner() {
    let mut token = launched(WEDNESDAY);
    assert_eq!(
        token.set_reserve(&deployer(), addr("other")),
        Err(ContractError::ReserveAlreadySet)
    );
    let mut fresh = TacoToken::new(deployer(), TOTAL_SUPPLY, WEDNESDAY);
    assert_eq!(
        fresh.set_reserve(&addr("stranger"), reserve()),
        Err(ContractError::OwnerOnly)
    );
}

#[test]
fn crunch_without_reserve_is_rejected() {
    let mut token = TacoToken::new(deployer(), TOTAL_SUPPLY, WEDNESDAY);
    token.unpause(&deployer(), WEDNESDAY).unwrap();
    assert_eq!(
        token.crunch(&addr("taquero"), WEDNESDAY + 300),
        Err(ContractError::ReserveNotSet)
    );
    assert_eq!(token.crunch_amount(WEDNESDAY + 300), 0);
}

#[test]
fn crunch_rate_bounds() {
    let mut token = launched(WEDNESDAY);
    assert_eq!(token.crunch_rate(), 4);
    token.set_crunch_rate(&deployer(), 1).unwrap();
    assert_eq!(token.crunch_rate(), 1);
    token.set_crunch_rate(&deployer(), 10).unwrap();
    assert_eq!(token.crunch_rate(), 10);

    let err = token.set_crunch_rate(&deployer(), 0).unwrap_err();
    assert_eq!(err.to_string(), "crunchRate must be at least 1 and at most 10, got 0");
    assert!(token.set_crunch_rate(&deployer(), 11).is_err());
    assert_eq!(token.crunch_rate(), 10);

    assert_eq!(
        token.set_crunch_rate(&addr("stranger"), 1),
        Err(ContractError::OwnerOnly)
    );
}

#[test]
fn reward_for_taquero_bounds() {
    let mut token = launched(WEDNESDAY);
    assert_eq!(token.reward_for_taquero(), 1);
    token.set_reward_for_taquero(&deployer(), 2).unwrap();
    token.set_reward_for_taquero(&deployer(), 10).unwrap();
    assert_eq!(token.reward_for_taquero(), 10);
    assert!(token.set_reward_for_taquero(&deployer(), 0).is_err());
    assert!(token.set_reward_for_taquero(&deployer(), 11).is_err());
    assert_eq!(
        token.set_reward_for_taquero(&addr("stranger"), 1),
        Err(ContractError::OwnerOnly)
    );
}

#[test]
fn taco_tuesday_multiplier_bounds() {
    let mut token = launched(WEDNESDAY);
    assert_eq!(token.taco_tuesday_multiplier(), 20);
    token.set_taco_tuesday_multiplier(&deployer(), 15).unwrap();
    token.set_taco_tuesday_multiplier(&deployer(), 30).unwrap();
    assert_eq!(token.taco_tuesday_multiplier(), 30);

    let err = token.set_taco_tuesday_multiplier(&deployer(), 9).unwrap_err();
    assert_eq!(
        err.to_string(),
        "tacoTuesdayRewardMultiplier must be at least 10 and at most 30, got 9"
    );
    assert!(token.set_taco_tuesday_multiplier(&deployer(), 31).is_err());
    assert_eq!(
        token.set_taco_tuesday_multiplier(&addr("stranger"), 1),
        Err(ContractError::OwnerOnly)
    );
}

// ---------------------------------------------------------------------------
// Crunch
// ---------------------------------------------------------------------------

#[test]
fn crunch_matches_the_reference_figures() {
    let mut token = unpaused(WEDNESDAY);
    let supply_before = token.total_supply();

    let outcome = token
        .crunch(&addr("taquero"), WEDNESDAY + 300)
        .unwrap()
        .expect("time has passed");

    // 14_530_320e18 * 4 * 300 / 100 / 86400
    assert_eq!(outcome.amount, 2_018_100_000_000_000_000_000);
    // * 1 * 10 / 1000
    assert_eq!(outcome.reward, 20_181_000_000_000_000_000);
    assert_eq!(outcome.burned, 1_997_919_000_000_000_000_000);
    assert_eq!(outcome.elapsed, 300);

    assert_eq!(token.total_supply(), supply_before - outcome.burned);
    assert_eq!(
        token.balance_of(&reserve()),
        CIRCULATING_SUPPLY - outcome.amount
    );
    assert_eq!(token.balance_of(&addr("taquero")), outcome.reward);
    assert_eq!(token.sum_of_balances(), token.total_supply());
    assert_eq!(token.total_crunched(), outcome.amount);
    assert_eq!(token.last_crunch_time(), WEDNESDAY + 300);
}

#[test]
fn crunch_follows_updated_parameters() {
    let mut token = launched(WEDNESDAY);
    token.set_crunch_rate(&deployer(), 10).unwrap();
    token.set_reward_for_taquero(&deployer(), 2).unwrap();
    token.set_taco_tuesday_multiplier(&deployer(), 30).unwrap();
    token.unpause(&deployer(), WEDNESDAY).unwrap();

    let outcome = token
        .crunch(&addr("taquero"), WEDNESDAY + 300)
        .unwrap()
        .unwrap();
    let expected_raw = CIRCULATING_SUPPLY * 10 * 300 / 100 / 86_400;
    // Wednesday: the taco-day multiplier does not apply.
    let expected_reward = expected_raw * 2 * 10 / 1000;
    assert_eq!(outcome.amount, expected_raw);
    assert_eq!(outcome.reward, expected_reward);
}

#[test]
fn taco_tuesday_doubles_the_reward() {
    let mut token = unpaused(TUESDAY_NOON);
    let outcome = token
        .crunch(&addr("taquero"), TUESDAY_NOON + 300)
        .unwrap()
        .unwrap();
    assert!(token.is_taco_tuesday(TUESDAY_NOON + 300));
    assert_eq!(outcome.reward, outcome.amount * 20 / 1000);
    assert_eq!(outcome.reward, 40_362_000_000_000_000_000);
}

#[test]
fn second_crunch_in_the_same_second_is_a_no_op() {
    let mut token = unpaused(WEDNESDAY);
    token.crunch(&addr("taquero"), WEDNESDAY + 300).unwrap().unwrap();

    let supply = token.total_supply();
    let stats = token.taquero_stats(&addr("taquero"));

    assert_eq!(token.crunch(&addr("taquero"), WEDNESDAY + 300), Ok(None));
    assert_eq!(token.total_supply(), supply);
    assert_eq!(token.taquero_stats(&addr("taquero")), stats);
    assert_eq!(token.last_crunch_time(), WEDNESDAY + 300);
}

#[test]
fn crunch_right_after_unpause_is_a_no_op() {
    let mut token = launched(WEDNESDAY);
    // Paused for a week; none of it accrues.
    let later = WEDNESDAY + 7 * 86_400;
    token.unpause(&deployer(), later).unwrap();
    assert_eq!(token.crunch_amount(later), 0);
    assert_eq!(token.crunch(&addr("taquero"), later), Ok(None));
}

#[test]
fn crunch_amount_previews_without_mutating() {
    let token = launched(WEDNESDAY);
    assert_eq!(token.crunch_amount(WEDNESDAY + 300), 0, "paused");

    let mut token = unpaused(WEDNESDAY);
    assert_eq!(token.crunch_amount(WEDNESDAY), 0, "no time passed");
    let preview = token.crunch_amount(WEDNESDAY + 300);
    assert!(preview > 0);
    assert_eq!(token.last_crunch_time(), WEDNESDAY);

    let outcome = token.crunch(&addr("taquero"), WEDNESDAY + 300).unwrap().unwrap();
    assert_eq!(outcome.amount, preview);
}

#[test]
fn crunch_never_takes_more_than_the_reserve() {
    let mut token = unpaused(WEDNESDAY);
    // 4% per day for 100 days would be 400% of the reserve.
    let outcome = token
        .crunch(&addr("taquero"), WEDNESDAY + 100 * 86_400)
        .unwrap()
        .unwrap();
    assert_eq!(outcome.amount, CIRCULATING_SUPPLY);
    assert_eq!(token.balance_of(&reserve()), 0);
    assert_eq!(token.sum_of_balances(), token.total_supply());
}

#[test]
fn taquero_stats_and_leaderboard() {
    let mut token = unpaused(WEDNESDAY);
    let mut now = WEDNESDAY;
    for who in ["alice", "bob", "alice", "carol", "alice", "bob"] {
        now += 600;
        token.crunch(&addr(who), now).unwrap().unwrap();
    }

    assert_eq!(token.taqueros(), &[addr("alice"), addr("bob"), addr("carol")]);
    assert_eq!(token.taquero_stats(&addr("alice")).times_crunched, 3);
    assert_eq!(token.taquero_stats(&addr("nobody")), TaqueroStat::default());

    let by_times = token.leaderboard(LeaderboardOrder::TimesCrunched, 10);
    assert_eq!(by_times[0].address, addr("alice"));
    assert_eq!(by_times[0].rank, 1);
    assert_eq!(by_times[1].address, addr("bob"));
    assert_eq!(by_times[2].address, addr("carol"));

    let top = token.leaderboard(LeaderboardOrder::TacosCrunched, 1);
    assert_eq!(top.len(), 1);
    assert_eq!(top[0].address, addr("alice"));

    let total: u128 = token
        .taqueros()
        .iter()
        .map(|a| token.taquero_stats(a).tacos_crunched)
        .sum();
    let rewards: u128 = ["alice", "bob", "carol"]
        .iter()
        .map(|a| token.balance_of(&addr(a)))
        .sum();
    assert_eq!(total, rewards);
}

#[test]
fn info_for_collects_the_dashboard() {
    let mut token = unpaused(WEDNESDAY);
    token.crunch(&addr("alice"), WEDNESDAY + 300).unwrap();

    let info = token.info_for(&addr("alice"), WEDNESDAY + 600);
    assert_eq!(info.balance, token.balance_of(&addr("alice")));
    assert_eq!(info.reserve_balance, token.balance_of(&reserve()));
    assert_eq!(info.crunchable, token.crunch_amount(WEDNESDAY + 600));
    assert_eq!(info.total_supply, token.total_supply());
    assert_eq!(info.last_crunch, WEDNESDAY + 300);
    assert!(!info.is_taco_tuesday);
    assert_eq!(info.taquero.times_crunched, 1);
}

#[test]
fn supply_only_ever_shrinks() {
    let mut token = unpaused(WEDNESDAY);
    let mut supply = token.total_supply();
    let mut now = WEDNESDAY;
    for step in 1..=20u64 {
        now += step * 97;
        token.crunch(&addr("taquero"), now).unwrap();
        assert!(token.total_supply() <= supply);
        assert_eq!(token.sum_of_balances(), token.total_supply());
        supply = token.total_supply();
    }
}
