//! Integration tests for the crowdsale.
//!
//! Each test builds the launch setup (token minted, sale seeded with the
//! circulating allocation and made pauser) and walks the clock through the
//! rounds.

use taconomics_contracts::allowlist::{KarmaPolicy, StaticReputation};
use taconomics_contracts::crowdsale::{Receipt, Round, SaleConfig, TacosCrowdsale};
use taconomics_contracts::error::{ContractError, ErrorKind};
use taconomics_contracts::taco_token::TacoToken;
use taconomics_protocol::config::{
    CIRCULATING_SUPPLY, COOKS_ROUND_START, KARMA_ROUND_START, PUBLIC_ROUND_START, TACOS_PER_UNIT,
    TOTAL_SUPPLY, UNIT,
};
use taconomics_protocol::types::{Address, Amount, Timestamp};

const BEFORE_SALE: Timestamp = COOKS_ROUND_START - 3_600;
const DURING_COOKS: Timestamp = COOKS_ROUND_START + 1;
const DURING_KARMA: Timestamp = KARMA_ROUND_START + 1;
const DURING_PUBLIC: Timestamp = PUBLIC_ROUND_START + 1;

fn addr(s: &str) -> Address {
    Address::new(s).unwrap()
}

fn owner() -> Address {
    addr("deployer")
}

fn units(n: u128) -> Amount {
    n * UNIT
}

fn tacos_for(value: Amount) -> Amount {
    value * TACOS_PER_UNIT
}

struct Launch {
    token: TacoToken,
    sale: TacosCrowdsale,
    oracle: StaticReputation,
}

impl Launch {
    fn new(config: SaleConfig) -> Self {
        let sale_address = addr("crowdsale");
        let mut token = TacoToken::new(owner(), TOTAL_SUPPLY, BEFORE_SALE);
        token.set_reserve(&owner(), addr("reserve")).unwrap();

        let mut sale = TacosCrowdsale::new(sale_address.clone(), owner(), config).unwrap();
        sale.set_cooks_list(&owner(), [addr("early_cook")]).unwrap();

        token
            .transfer(&owner(), &sale_address, CIRCULATING_SUPPLY)
            .unwrap();
        token.set_pauser(&owner(), sale_address).unwrap();

        Self {
            token,
            sale,
            oracle: StaticReputation::new([addr("karma_member")], [addr("karma_holder")]),
        }
    }

    fn send(&mut self, who: &str, amount: Amount, now: Timestamp) -> Result<Receipt, ContractError> {
        self.sale
            .receive_value(&mut self.token, &addr(who), amount, now, &self.oracle)
    }

    fn buy(&mut self, who: &str, amount: Amount, now: Timestamp) -> Result<Amount, ContractError> {
        match self.send(who, amount, now)? {
            Receipt::Purchased(p) => Ok(p.accepted),
            Receipt::Deposited { .. } => panic!("expected a purchase"),
        }
    }
}

fn launch() -> Launch {
    Launch::new(SaleConfig::default())
}

// ---------------------------------------------------------------------------
// Before the sale
// ---------------------------------------------------------------------------

#[test]
fn initial_state() {
    let l = launch();
    assert_eq!(l.sale.tacos_per_unit(), 34_596);
    assert_eq!(l.sale.current_round(BEFORE_SALE), None);
    assert!(!l.sale.is_open(BEFORE_SALE));
    assert!(!l.sale.has_ended());
    assert!(!l.sale.public_sale_started(BEFORE_SALE));
    assert_eq!(l.token.balance_of(l.sale.address()), CIRCULATING_SUPPLY);
    assert_eq!(l.token.pauser(), Some(l.sale.address()));
}

#[test]
fn set_cooks_list_is_owner_only_and_idempotent() {
    let mut l = launch();
    let added = l
        .sale
        .set_cooks_list(&owner(), [addr("early_cook"), addr("karma_holder"), addr("public")])
        .unwrap();
    assert_eq!(added, vec![addr("karma_holder"), addr("public")]);
    for who in ["early_cook", "karma_holder", "public"] {
        assert!(l.sale.allowlist().is_cook(&addr(who)));
    }
    assert_eq!(
        l.sale.set_cooks_list(&addr("early_cook"), [addr("x")]),
        Err(ContractError::OwnerOnly)
    );
}

#[test]
fn nobody_buys_before_the_sale() {
    let mut l = launch();
    for who in ["early_cook", "karma_member", "karma_holder", "public"] {
        assert_eq!(l.buy(who, units(1), BEFORE_SALE), Err(ContractError::SaleNotOpen));
    }
}

#[test]
fn owner_value_is_a_plain_deposit() {
    let mut l = launch();
    for now in [BEFORE_SALE, DURING_COOKS, DURING_PUBLIC] {
        let receipt = l.send("deployer", 200, now).unwrap();
        assert_eq!(
            receipt,
            Receipt::Deposited {
                from: owner(),
                amount: 200
            }
        );
        assert_eq!(receipt.debited(), 200);
    }
    assert_eq!(l.sale.wei_raised(), 0);
    assert_eq!(l.token.balance_of(&owner()), TOTAL_SUPPLY - CIRCULATING_SUPPLY);
}

// ---------------------------------------------------------------------------
// Cooks round
// ---------------------------------------------------------------------------

#[test]
fn cooks_round_state() {
    let l = launch();
    assert!(l.sale.is_open(DURING_COOKS));
    assert!(!l.sale.has_ended());
    assert!(!l.sale.public_sale_started(DURING_COOKS));
    assert_eq!(l.sale.current_round(DURING_COOKS), Some(Round::Cooks));
}

#[test]
fn early_cook_buys_two_units() {
    let mut l = launch();
    let receipt = l.send("early_cook", units(2), DURING_COOKS).unwrap();
    let Receipt::Purchased(purchase) = receipt else {
        panic!("expected a purchase");
    };
    assert_eq!(purchase.round, Round::Cooks);
    assert_eq!(purchase.accepted, units(2));
    assert_eq!(purchase.refunded, 0);
    assert_eq!(purchase.tokens, units(34_596 * 2));
    assert_eq!(l.token.balance_of(&addr("early_cook")), units(69_192));
    assert_eq!(l.sale.wei_raised(), units(2));
}

#[test]
fn early_cook_buys_a_fraction() {
    let mut l = launch();
    let value = units(3) / 2;
    assert_eq!(l.buy("early_cook", value, DURING_COOKS), Ok(value));
    assert_eq!(l.token.balance_of(&addr("early_cook")), units(51_894));
}

#[test]
fn oversized_contribution_is_trimmed_to_the_address_cap() {
    let mut l = launch();
    let receipt = l.send("early_cook", units(15), DURING_COOKS).unwrap();
    let Receipt::Purchased(purchase) = receipt.clone() else {
        panic!("expected a purchase");
    };
    assert_eq!(purchase.sent, units(15));
    assert_eq!(purchase.accepted, units(12));
    assert_eq!(purchase.refunded, units(3));
    assert_eq!(receipt.debited(), units(12));
    assert_eq!(l.token.balance_of(&addr("early_cook")), tacos_for(units(12)));
    assert_eq!(l.sale.remaining_allowance(&addr("early_cook")), 0);

    assert_eq!(
        l.buy("early_cook", units(15), DURING_COOKS),
        Err(ContractError::AddressCapFilled)
    );
    assert_eq!(l.sale.wei_raised(), units(12));
}

#[test]
fn minimum_contribution_is_enforced() {
    let mut l = launch();
    let value = units(9) / 100;
    assert_eq!(
        l.buy("early_cook", value, DURING_COOKS),
        Err(ContractError::BelowMinimumContribution {
            amount: value,
            minimum: units(1) / 10
        })
    );
    assert_eq!(l.token.balance_of(&addr("early_cook")), 0);
}

#[test]
fn only_cooks_buy_in_the_cooks_round() {
    let mut l = launch();
    for who in ["karma_member", "karma_holder", "public"] {
        assert_eq!(
            l.buy(who, 200, DURING_COOKS),
            Err(ContractError::NotEligibleForRound {
                round: "Cooks".into()
            })
        );
    }
}

#[test]
fn cooks_round_stops_at_seventy_units() {
    let mut l = launch();
    let cooks: Vec<Address> = (0..10).map(|i| addr(&format!("cook{i}"))).collect();
    l.sale.set_cooks_list(&owner(), cooks.clone()).unwrap();

    for (i, cook) in cooks.iter().enumerate() {
        let result = l.buy(cook.as_str(), units(10), DURING_COOKS);
        if i < 7 {
            assert_eq!(result, Ok(units(10)));
            assert_eq!(l.token.balance_of(cook), tacos_for(units(10)));
        } else {
            assert_eq!(
                result,
                Err(ContractError::RoundCapFilled {
                    round: "Cooks".into()
                })
            );
            assert_eq!(l.token.balance_of(cook), 0);
        }
    }
    assert_eq!(l.sale.wei_raised(), units(70));
}

#[test]
fn a_purchase_straddling_the_round_cap_is_trimmed() {
    let mut l = launch();
    let cooks: Vec<Address> = (0..7).map(|i| addr(&format!("cook{i}"))).collect();
    l.sale.set_cooks_list(&owner(), cooks.clone()).unwrap();

    for cook in &cooks[..6] {
        l.buy(cook.as_str(), units(11), DURING_COOKS).unwrap();
    }
    // 66 raised; 4 left in the round.
    assert_eq!(l.buy("cook6", units(10), DURING_COOKS), Ok(units(4)));
    assert_eq!(l.sale.wei_raised(), units(70));
}

// ---------------------------------------------------------------------------
// Karma round
// ---------------------------------------------------------------------------

#[test]
fn karma_round_state() {
    let l = launch();
    assert!(l.sale.is_open(DURING_KARMA));
    assert!(!l.sale.public_sale_started(DURING_KARMA));
    assert_eq!(l.sale.current_round(DURING_KARMA), Some(Round::Karma));
}

#[test]
fn karma_member_buys() {
    let mut l = launch();
    assert_eq!(l.buy("karma_member", units(2), DURING_KARMA), Ok(units(2)));
    assert_eq!(l.token.balance_of(&addr("karma_member")), units(69_192));

    assert_eq!(l.buy("karma_member", units(15), DURING_KARMA), Ok(units(10)));
    assert_eq!(
        l.buy("karma_member", units(1), DURING_KARMA),
        Err(ContractError::AddressCapFilled)
    );
}

#[test]
fn holders_and_strangers_wait_for_public_by_default() {
    let mut l = launch();
    for who in ["karma_holder", "public"] {
        assert_eq!(
            l.buy(who, 200, DURING_KARMA),
            Err(ContractError::NotEligibleForRound {
                round: "Karma".into()
            })
        );
    }
}

#[test]
fn member_or_holder_policy_admits_holders() {
    let mut l = Launch::new(SaleConfig {
        karma_policy: KarmaPolicy::MemberOrHolder,
        ..SaleConfig::default()
    });
    assert_eq!(l.buy("karma_holder", units(2), DURING_KARMA), Ok(units(2)));
    assert!(l.buy("public", units(2), DURING_KARMA).is_err());
}

#[test]
fn address_cap_spans_rounds() {
    let mut l = launch();
    l.oracle.members.insert(addr("early_cook"));

    assert_eq!(l.buy("early_cook", units(8), DURING_COOKS), Ok(units(8)));
    assert_eq!(l.buy("early_cook", units(8), DURING_KARMA), Ok(units(4)));
    assert_eq!(
        l.buy("early_cook", units(1), DURING_PUBLIC),
        Err(ContractError::AddressCapFilled)
    );
    assert_eq!(l.sale.contribution_of(&addr("early_cook")), units(12));
}

#[test]
fn karma_round_stops_at_one_hundred_forty_units() {
    let mut l = launch();
    for i in 0..16 {
        l.oracle.members.insert(addr(&format!("member{i}")));
    }
    let mut accepted = 0;
    for i in 0..16 {
        match l.buy(&format!("member{i}"), units(10), DURING_KARMA) {
            Ok(value) => accepted += value,
            Err(e) => assert_eq!(
                e,
                ContractError::RoundCapFilled {
                    round: "Karma".into()
                }
            ),
        }
    }
    assert_eq!(accepted, units(140));
    assert_eq!(l.sale.wei_raised(), units(140));
}

// ---------------------------------------------------------------------------
// Public round
// ---------------------------------------------------------------------------

#[test]
fn public_round_state() {
    let l = launch();
    assert!(l.sale.is_open(DURING_PUBLIC));
    assert!(l.sale.public_sale_started(DURING_PUBLIC));
    assert_eq!(l.sale.current_round(DURING_PUBLIC), Some(Round::Public));
}

#[test]
fn anyone_buys_in_public() {
    let mut l = launch();
    for who in ["karma_member", "karma_holder", "public", "early_cook"] {
        assert_eq!(l.buy(who, units(2), DURING_PUBLIC), Ok(units(2)));
        assert_eq!(l.token.balance_of(&addr(who)), tacos_for(units(2)));
    }
}

#[test]
fn hardcap_ends_the_sale() {
    let mut l = launch();
    for i in 0..17 {
        assert_eq!(l.buy(&format!("buyer{i}"), units(12), DURING_PUBLIC), Ok(units(12)));
    }
    // 204 raised, 6 left.
    let receipt = l.send("buyer17", units(12), DURING_PUBLIC).unwrap();
    let Receipt::Purchased(last) = receipt else {
        panic!("expected a purchase");
    };
    assert_eq!(last.accepted, units(6));
    assert_eq!(last.refunded, units(6));

    assert!(l.sale.has_ended());
    assert!(!l.sale.is_open(DURING_PUBLIC));
    assert_eq!(l.sale.wei_raised(), units(210));
    assert_eq!(l.buy("buyer18", units(10), DURING_PUBLIC), Err(ContractError::SaleEnded));

    assert_eq!(l.token.balance_of(l.sale.address()), CIRCULATING_SUPPLY / 2);
}

#[test]
fn sale_that_cannot_deliver_is_an_invariant_violation() {
    let mut token = TacoToken::new(owner(), TOTAL_SUPPLY, BEFORE_SALE);
    let mut sale = TacosCrowdsale::new(addr("crowdsale"), owner(), SaleConfig::default()).unwrap();
    // Made pauser but never seeded.
    token.set_pauser(&owner(), addr("crowdsale")).unwrap();
    let oracle = StaticReputation::default();

    let err = sale
        .purchase(&mut token, &addr("public"), units(1), DURING_PUBLIC, &oracle)
        .unwrap_err();
    assert!(matches!(err, ContractError::InvariantViolation(_)));
    assert_eq!(sale.wei_raised(), 0);
    assert_eq!(sale.contribution_of(&addr("public")), 0);
    assert_eq!(token.balance_of(&addr("public")), 0);
}

#[test]
fn a_controller_that_lost_the_pauser_role_is_paused_not_broken() {
    let mut l = launch();
    l.token.set_pauser(&owner(), owner()).unwrap();

    assert_eq!(l.buy("public", units(1), DURING_PUBLIC), Err(ContractError::Paused));
    assert_eq!(ContractError::Paused.kind(), ErrorKind::State);
    assert_eq!(l.sale.wei_raised(), 0);
    assert_eq!(l.sale.contribution_of(&addr("public")), 0);
}

#[test]
fn the_controller_cannot_buy_from_itself() {
    let mut l = launch();
    assert_eq!(l.buy("public", units(12), DURING_PUBLIC), Ok(units(12)));

    let sale_address = l.sale.address().clone();
    assert_eq!(
        l.send(sale_address.as_str(), units(12), DURING_PUBLIC),
        Err(ContractError::SelfPurchase)
    );
    assert_eq!(
        l.sale.purchase(&mut l.token, &sale_address, units(12), DURING_PUBLIC, &l.oracle),
        Err(ContractError::SelfPurchase)
    );
    // Rejected even before the sale opens.
    assert_eq!(
        l.send(sale_address.as_str(), units(1), BEFORE_SALE),
        Err(ContractError::SelfPurchase)
    );

    assert_eq!(l.sale.wei_raised(), units(12));
    assert_eq!(l.sale.contribution_of(&sale_address), 0);
    assert_eq!(l.token.balance_of(&sale_address), CIRCULATING_SUPPLY - tacos_for(units(12)));
}

#[test]
fn raised_never_exceeds_the_active_round_cap() {
    let mut l = launch();
    let mut now = DURING_COOKS;
    let cooks: Vec<Address> = (0..30).map(|i| addr(&format!("c{i}"))).collect();
    l.sale.set_cooks_list(&owner(), cooks.clone()).unwrap();
    for i in 0..30 {
        l.oracle.members.insert(addr(&format!("c{i}")));
    }

    let mut last_raised = 0;
    for (i, cook) in cooks.iter().enumerate() {
        if i == 10 {
            now = DURING_KARMA;
        }
        if i == 20 {
            now = DURING_PUBLIC;
        }
        let _ = l.buy(cook.as_str(), units(9), now);
        let round = l.sale.current_round(now).unwrap();
        assert!(l.sale.wei_raised() <= l.sale.config().schedule.cap_of(round));
        assert!(l.sale.wei_raised() >= last_raised);
        last_raised = l.sale.wei_raised();
    }
}
