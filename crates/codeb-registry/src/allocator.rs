//! ポート・ドメインの割り当て

use crate::error::{RegistryError, Result};
use crate::model::{PortAllocation, Registry};
use std::collections::BTreeSet;

pub const PRODUCTION: &str = "production";
pub const STAGING: &str = "staging";
pub const PREVIEW: &str = "preview";

/// ポート割り当て方針
///
/// 呼び出し側は常にこの trait 経由で割り当てるので、将来フリーリスト方式などに
/// 差し替える場合も呼び出し側は変わらない。
pub trait PortAllocationPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    /// `class` のポートを 1 つ割り当てる。`in_use` は既に使われているポート。
    fn allocate(
        &self,
        ports: &mut PortAllocation,
        class: &str,
        in_use: &BTreeSet<u16>,
    ) -> Result<u16>;
}

/// `next_available` を単調増加させるだけで、解放されたポートは再利用しない
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverReuse;

impl PortAllocationPolicy for NeverReuse {
    fn name(&self) -> &'static str {
        "never-reuse"
    }

    fn allocate(
        &self,
        ports: &mut PortAllocation,
        class: &str,
        in_use: &BTreeSet<u16>,
    ) -> Result<u16> {
        let PortAllocation {
            reserved,
            range,
            next_available,
        } = ports;

        let next = next_available
            .get_mut(class)
            .ok_or_else(|| RegistryError::UnknownPortClass(class.to_string()))?;

        loop {
            let candidate = *next;
            *next = next
                .checked_add(1)
                .ok_or_else(|| RegistryError::PortsExhausted(class.to_string()))?;

            if let Some(service) = reserved.get(&candidate) {
                tracing::warn!(
                    "ポート {} は予約済み ({}) のためスキップします [{}]",
                    candidate,
                    service,
                    class
                );
                continue;
            }
            if in_use.contains(&candidate) {
                tracing::warn!(
                    "ポート {} は既に使用されているためスキップします [{}]",
                    candidate,
                    class
                );
                continue;
            }

            if let Some(range) = range.get(class)
                && !range.contains(candidate)
            {
                tracing::warn!(
                    "ポート {} は {} の範囲 {} を超えています",
                    candidate,
                    class,
                    range
                );
            }

            return Ok(candidate);
        }
    }
}

/// `class` の次のポートを割り当てる（増分はメモリ上のみ。save で確定）
pub fn allocate(registry: &mut Registry, class: &str) -> Result<u16> {
    allocate_with(registry, class, &NeverReuse)
}

pub fn allocate_with(
    registry: &mut Registry,
    class: &str,
    policy: &dyn PortAllocationPolicy,
) -> Result<u16> {
    let in_use = registry.used_ports();
    policy.allocate(&mut registry.ports, class, &in_use)
}

/// プロジェクト名と環境からドメインを組み立てる
///
/// - production: `<project>.<base>`
/// - それ以外:   `<project>-<env>.<base>`
pub fn build_domain(project: &str, env: &str, base_domain: &str) -> String {
    if env == PRODUCTION {
        format!("{}.{}", project, base_domain)
    } else {
        format!("{}-{}.{}", project, env, base_domain)
    }
}
