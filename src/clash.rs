//! Decides what a candidate module replaces in a modules-proxy registry.
use crate::domain::error::OrchestratorError;
use crate::domain::types::{ModuleClashReport, ModuleReplacement, NoReplacementReason};
use crate::features::abi::IModulesProxyRegistry;
use crate::features::chain::{read_contract, ChainClient};
use alloy_primitives::Address;
use canlog::{log, GetLogFilter, LogFilter, LogPriorityLevels};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Serialize, Deserialize, LogPriorityLevels)]
enum ClashLogPriority {
    #[log_level(capacity = 500, name = "CLASH_INFO")]
    Info,
    #[log_level(capacity = 500, name = "CLASH_ERROR")]
    Error,
}

impl GetLogFilter for ClashLogPriority {
    fn get_log_filter() -> LogFilter {
        LogFilter::ShowAll
    }
}

pub struct ModuleClashResolver<'a, C: ChainClient + ?Sized> {
    client: &'a C,
}

impl<'a, C: ChainClient + ?Sized> ModuleClashResolver<'a, C> {
    pub const fn new(client: &'a C) -> Self {
        Self { client }
    }

    pub async fn check_clashes(
        &self,
        registry: Address,
        candidate: Address,
    ) -> Result<ModuleClashReport, OrchestratorError> {
        let clashes = read_contract(
            self.client,
            registry,
            &IModulesProxyRegistry::checkClashingFuncSelectorsCall {
                newModule: candidate,
            },
        )
        .await?;
        Ok(ModuleClashReport {
            clashing_modules: clashes.clashingModules,
            clashing_module_selectors: clashes.clashingModulesFuncSelectors,
            clashing_reserved_selectors: clashes.clashingProxyRegistryFuncSelectors,
        })
    }

    pub async fn resolve(
        &self,
        registry: Address,
        candidate: Address,
    ) -> Result<ModuleReplacement, OrchestratorError> {
        let report = self.check_clashes(registry, candidate).await?;
        resolve_report(&report, candidate)
    }
}

/// Maps a clash report to a replacement decision.
///
/// Reserved selector clashes always win; otherwise the deduplicated set of
/// clashing modules must be empty or a single address.
/// All-zero `0x00000000` reserved selectors are padding and never count as a clash.
pub fn resolve_report(
    report: &ModuleClashReport,
    candidate: Address,
) -> Result<ModuleReplacement, OrchestratorError> {
    let reserved = report.reserved_clashes();
    if !reserved.is_empty() {
        for selector in &reserved {
            log!(
                ClashLogPriority::Error,
                "candidate={} reserved_selector={} clash",
                candidate,
                selector
            );
        }
        return Err(OrchestratorError::ReservedSelectorClash {
            candidate,
            selectors: reserved,
        });
    }

    let modules = report.distinct_modules();
    match modules.as_slice() {
        [] => Ok(ModuleReplacement::NoReplacement(
            NoReplacementReason::FreshRegistration,
        )),
        [only] if *only == candidate => {
            log!(
                ClashLogPriority::Info,
                "candidate={} already registered, skipping",
                candidate
            );
            Ok(ModuleReplacement::NoReplacement(
                NoReplacementReason::AlreadyRegistered,
            ))
        }
        [only] => {
            log!(
                ClashLogPriority::Info,
                "candidate={} replaces module={}",
                candidate,
                only
            );
            Ok(ModuleReplacement::Replace(*only))
        }
        _ => {
            for module in &modules {
                log!(
                    ClashLogPriority::Error,
                    "candidate={} clashing_module={}",
                    candidate,
                    module
                );
            }
            Err(OrchestratorError::MultiModuleClash { candidate, modules })
        }
    }
}
