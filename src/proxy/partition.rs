//! # 分区哈希
//!
//! 将租户键映射到固定数量的分区之一。使用 32 位 `MurmurHash3` (`x86_32`)，种子固定，
//! 保证不同进程、不同版本之间结果一致。

/// 固定哈希种子
pub const DEFAULT_SEED: u32 = 54_325;
/// 默认分区数
pub const DEFAULT_PARTITION_COUNT: u32 = 128;

const C1: u32 = 0xcc9e_2d51;
const C2: u32 = 0x1b87_3593;

/// 分区哈希器
#[derive(Debug, Clone, Copy)]
pub struct PartitionHasher {
    partition_count: u32,
}

impl Default for PartitionHasher {
    fn default() -> Self {
        Self {
            partition_count: DEFAULT_PARTITION_COUNT,
        }
    }
}

impl PartitionHasher {
    /// 使用指定分区数创建哈希器，分区数为 0 时按 1 处理
    #[must_use]
    pub const fn new(partition_count: u32) -> Self {
        Self {
            partition_count: if partition_count == 0 { 1 } else { partition_count },
        }
    }

    /// 分区数
    #[must_use]
    pub const fn partition_count(&self) -> u32 {
        self.partition_count
    }

    /// 计算租户键所属分区，结果位于 `[0, partition_count)`
    #[must_use]
    pub fn resolve(&self, key: &str) -> u32 {
        murmur3_32(key.as_bytes(), DEFAULT_SEED) % self.partition_count
    }
}

/// 使用默认分区数 (128) 计算分区
#[must_use]
pub fn resolve(key: &str) -> u32 {
    PartitionHasher::default().resolve(key)
}

/// `MurmurHash3` `x86_32`
#[must_use]
pub fn murmur3_32(data: &[u8], seed: u32) -> u32 {
    let mut hash = seed;
    let mut blocks = data.chunks_exact(4);

    for block in blocks.by_ref() {
        let k = u32::from_le_bytes([block[0], block[1], block[2], block[3]]);
        hash ^= mix_k(k);
        hash = hash.rotate_left(13).wrapping_mul(5).wrapping_add(0xe654_6b64);
    }

    let tail = blocks.remainder();
    if !tail.is_empty() {
        let mut k = 0u32;
        for (i, byte) in tail.iter().enumerate() {
            k |= u32::from(*byte) << (8 * i);
        }
        hash ^= mix_k(k);
    }

    // 长度按 32 位截断，与参考实现一致
    #[allow(clippy::cast_possible_truncation)]
    let len = data.len() as u32;
    hash ^= len;
    fmix32(hash)
}

const fn mix_k(k: u32) -> u32 {
    k.wrapping_mul(C1).rotate_left(15).wrapping_mul(C2)
}

const fn fmix32(mut h: u32) -> u32 {
    h ^= h >> 16;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^= h >> 16;
    h
}
