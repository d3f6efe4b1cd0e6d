//! Account resolution for model-supplied references.
//!
//! Precedence: exact code, exact name, unique name substring, category
//! fallback. A tier with several candidates is an error naming them all;
//! the resolver never guesses.

use crate::error::AgentError;
use crate::models::{Account, CategoryFallback};
use crate::Result;

pub fn resolve_account<'a>(
    accounts: &'a [Account],
    query: &str,
    role: &str,
    fallback: Option<&CategoryFallback>,
) -> Result<&'a Account> {
    let query = query.trim();

    if !query.is_empty() {
        // Tier 1: exact code
        if let Some(account) = accounts.iter().find(|account| account.code == query) {
            return Ok(account);
        }

        let needle = query.to_lowercase();

        // Tier 2: exact name, case-insensitive
        let exact: Vec<&Account> = accounts
            .iter()
            .filter(|account| account.name.to_lowercase() == needle)
            .collect();
        match exact.len() {
            1 => return Ok(exact[0]),
            0 => {}
            _ => return Err(ambiguous(query, role, &exact)),
        }

        // Tier 3: unique name substring
        let partial: Vec<&Account> = accounts
            .iter()
            .filter(|account| account.name.to_lowercase().contains(&needle))
            .collect();
        match partial.len() {
            1 => return Ok(partial[0]),
            0 => {}
            _ => return Err(ambiguous(query, role, &partial)),
        }
    }

    // Tier 4: category fallback
    if let Some(fallback) = fallback {
        let keyword = fallback.keyword.to_lowercase();
        let candidates: Vec<&Account> = accounts
            .iter()
            .filter(|account| account.kind == fallback.kind)
            .filter(|account| account.name.to_lowercase().contains(&keyword))
            .collect();
        match candidates.len() {
            1 => return Ok(candidates[0]),
            0 => {}
            _ => return Err(ambiguous(&fallback.keyword, role, &candidates)),
        }
    }

    Err(AgentError::ResolutionError(format!(
        "could not resolve the {} account from '{}'",
        role, query
    )))
}

fn ambiguous(query: &str, role: &str, candidates: &[&Account]) -> AgentError {
    let listed = candidates
        .iter()
        .map(|account| format!("{} {}", account.code, account.name))
        .collect::<Vec<_>>()
        .join(", ");

    AgentError::ResolutionError(format!(
        "ambiguous {} account reference '{}': matches {}",
        role, query, listed
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AccountKind;
    use uuid::Uuid;

    fn account(code: &str, name: &str, kind: AccountKind) -> Account {
        Account {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            code: code.to_string(),
            name: name.to_string(),
            kind,
            active: true,
        }
    }

    fn chart() -> Vec<Account> {
        vec![
            account("1000", "Cash", AccountKind::Asset),
            account("1010", "Bank Checking", AccountKind::Asset),
            account("1100", "Accounts Receivable", AccountKind::Asset),
            account("4000", "Sales Revenue", AccountKind::Revenue),
            account("4100", "Service Revenue", AccountKind::Revenue),
            account("5100", "Rent Expense", AccountKind::Expense),
        ]
    }

    #[test]
    fn test_exact_code_wins() {
        let accounts = chart();
        let found = resolve_account(&accounts, "4100", "revenue", None).unwrap();
        assert_eq!(found.name, "Service Revenue");
    }

    #[test]
    fn test_exact_name_beats_substring() {
        let accounts = chart();
        // "Cash" is also a substring of nothing else here, but exact matching
        // must not be confused by case.
        let found = resolve_account(&accounts, "cash", "cash", None).unwrap();
        assert_eq!(found.code, "1000");
    }

    #[test]
    fn test_unique_substring_match() {
        let accounts = chart();
        let found = resolve_account(&accounts, "receivable", "receivable", None).unwrap();
        assert_eq!(found.code, "1100");
    }

    #[test]
    fn test_ambiguous_substring_names_candidates() {
        let accounts = chart();
        let error = resolve_account(&accounts, "revenue", "revenue", None).unwrap_err();
        let message = error.to_string();
        assert!(message.contains("Sales Revenue"));
        assert!(message.contains("Service Revenue"));
    }

    #[test]
    fn test_category_fallback_when_text_misses() {
        let accounts = chart();
        let fallback = CategoryFallback {
            kind: AccountKind::Revenue,
            keyword: "sales".to_string(),
        };
        let found = resolve_account(&accounts, "proceeds", "revenue", Some(&fallback)).unwrap();
        assert_eq!(found.code, "4000");
    }

    #[test]
    fn test_unresolved_names_the_role() {
        let accounts = chart();
        let error = resolve_account(&accounts, "petty float", "petty cash", None).unwrap_err();
        assert!(error.to_string().contains("petty cash"));
    }

    #[test]
    fn test_empty_query_uses_fallback_only() {
        let accounts = chart();
        let fallback = CategoryFallback {
            kind: AccountKind::Expense,
            keyword: "rent".to_string(),
        };
        let found = resolve_account(&accounts, "", "expense", Some(&fallback)).unwrap();
        assert_eq!(found.code, "5100");
    }
}
