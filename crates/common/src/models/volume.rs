/// 卷绑定编解码与集合操作
///
/// 卷描述字符串格式:
/// `pool/image:dst[:flags][:size][:read_IOPS:write_IOPS:read_bytes:write_bytes]`

use std::collections::{HashMap, HashSet};
use std::ops::{Deref, DerefMut};

use serde::de;
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::utils::parse_in_human;
use crate::{Error, Result};

/// 单个卷绑定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeBinding {
    pub pool: String,
    pub image: String,
    pub destination: String,
    pub flags: String,
    pub size_in_bytes: i64,
    pub read_iops: i64,
    pub write_iops: i64,
    pub read_bps: i64,
    pub write_bps: i64,
}

impl VolumeBinding {
    /// 解析卷描述字符串
    ///
    /// 只给 `src:dst` 时 flags 默认 "rw"，缺失的数值字段补 0。
    /// image 允许为空（请求上下文中稍后自动生成），严格校验在落盘前做。
    pub fn parse(volume: &str) -> Result<Self> {
        let mut parts: Vec<String> = volume.split(':').map(str::to_string).collect();
        if parts.len() > 8 || parts.len() < 2 {
            return Err(Error::InvalidVolume(volume.to_string()));
        }
        if parts.len() == 2 {
            parts.push("rw".to_string());
        }
        while parts.len() < 8 {
            parts.push("0".to_string());
        }

        let mut numbers = [0i64; 5];
        for (i, n) in numbers.iter_mut().enumerate() {
            *n = parse_in_human(&parts[i + 3])?;
        }

        // 只排序不去重，重复的 flag 字符按原样保留
        let mut flag_chars: Vec<char> = parts[2].chars().collect();
        flag_chars.sort_unstable();
        let mut flags: String = flag_chars.into_iter().collect();
        if flags.is_empty() {
            flags = "rw".to_string();
        }

        let src_parts: Vec<&str> = parts[0].split('/').collect();
        if src_parts.len() != 2 {
            return Err(Error::InvalidVolume(format!(
                "源格式应为 pool/image: {volume}"
            )));
        }

        let vb = VolumeBinding {
            pool: src_parts[0].to_string(),
            image: src_parts[1].to_string(),
            destination: parts[1].clone(),
            flags,
            size_in_bytes: numbers[0],
            read_iops: numbers[1],
            write_iops: numbers[2],
            read_bps: numbers[3],
            write_bps: numbers[4],
        };
        vb.validate(false)?;
        Ok(vb)
    }

    /// 卷来源，`pool/image` 形式
    pub fn source(&self) -> String {
        format!("{}/{}", self.pool, self.image)
    }

    /// 集合操作使用的身份键
    pub fn map_key(&self) -> (String, String, String) {
        (
            self.pool.clone(),
            self.image.clone(),
            self.destination.clone(),
        )
    }

    /// 是否为 monitor-only 绑定（只做记账，不落实到后端）
    pub fn is_monitor_only(&self) -> bool {
        self.flags.contains('m')
    }

    /// 校验绑定是否合法
    ///
    /// `materialized` 为真时要求 pool 与 image 非空，落盘前必须通过
    pub fn validate(&self, materialized: bool) -> Result<()> {
        if self.destination.is_empty() {
            return Err(Error::InvalidVolume(format!(
                "目的路径不能为空: {self:?}"
            )));
        }
        if materialized && (self.pool.is_empty() || self.image.is_empty()) {
            return Err(Error::InvalidVolume(format!(
                "pool 和 image 不能为空: {self:?}"
            )));
        }
        Ok(())
    }

    /// 重新序列化为卷描述字符串
    ///
    /// `normalize` 为假时固定输出 8 段完整格式；为真时去掉 m flag、把 o 改写为
    /// ro/wo，并在没有 IO 限速时输出 2 段或 4 段的短格式
    pub fn to_volume_string(&self, normalize: bool) -> String {
        let mut flags = self.flags.clone();
        if normalize {
            flags = flags.replace('m', "");
        }
        if flags.contains('o') {
            flags = flags.replace('o', "");
            flags = flags.replace('r', "ro");
            flags = flags.replace('w', "wo");
        }
        let src = format!("{}/{}", self.pool, self.image);
        if !normalize {
            return format!(
                "{src}:{}:{flags}:{}:{}:{}:{}:{}",
                self.destination,
                self.size_in_bytes,
                self.read_iops,
                self.write_iops,
                self.read_bps,
                self.write_bps
            );
        }
        if self.flags.is_empty() && self.size_in_bytes == 0 {
            format!("{src}:{}", self.destination)
        } else if self.read_iops != 0
            || self.write_iops != 0
            || self.read_bps != 0
            || self.write_bps != 0
        {
            format!(
                "{src}:{}:{flags}:{}:{}:{}:{}:{}",
                self.destination,
                self.size_in_bytes,
                self.read_iops,
                self.write_iops,
                self.read_bps,
                self.write_bps
            )
        } else {
            format!("{src}:{}:{flags}:{}", self.destination, self.size_in_bytes)
        }
    }
}

/// 卷绑定集合，保持插入顺序
#[derive(Debug, Clone, Default)]
pub struct VolumeBindings(pub Vec<VolumeBinding>);

impl VolumeBindings {
    /// 逐条解析卷描述字符串
    pub fn parse<S: AsRef<str>>(volumes: &[S]) -> Result<Self> {
        let mut bindings = Vec::with_capacity(volumes.len());
        for volume in volumes {
            bindings.push(VolumeBinding::parse(volume.as_ref())?);
        }
        Ok(VolumeBindings(bindings))
    }

    /// 与另一集合比较：数量一致，且每个身份键对应的绑定逐字段相同
    pub fn equal(&self, other: &VolumeBindings) -> bool {
        if self.0.len() != other.0.len() {
            return false;
        }
        let seen: HashMap<_, &VolumeBinding> =
            self.iter().map(|vb| (vb.map_key(), vb)).collect();
        other
            .iter()
            .all(|vb| seen.get(&vb.map_key()).is_some_and(|v| *v == vb))
    }

    /// 所有绑定的大小之和，delta 集合可能为负
    pub fn total_size(&self) -> i64 {
        self.iter().map(|vb| vb.size_in_bytes).sum()
    }

    /// 集合级校验：目的路径不可重复；非 monitor 绑定的来源不可重复
    pub fn validate(&self) -> Result<()> {
        let mut seen_dest = HashSet::new();
        let mut seen_src = HashSet::new();
        for vb in self.iter() {
            vb.validate(false)
                .map_err(|e| Error::InvalidVolumes(e.to_string()))?;
            if !seen_dest.insert(vb.destination.clone()) {
                return Err(Error::InvalidVolumes(format!(
                    "目的路径重复: {}",
                    vb.destination
                )));
            }
            let src = vb.source();
            if !seen_src.insert(src.clone()) && !vb.image.is_empty() && !vb.is_monitor_only()
            {
                return Err(Error::InvalidVolumes(format!("卷来源重复: {src}")));
            }
        }
        Ok(())
    }

    /// 按身份键做加法合并
    ///
    /// 键重叠时逐项累加所有数值字段，非数值字段取首次出现的值；
    /// 合并后大小不为正的绑定被丢弃，负值 delta 由此表达"删除该卷"。
    /// 输出保持首次出现的顺序。
    pub fn merge(primary: &VolumeBindings, overlays: &[&VolumeBindings]) -> VolumeBindings {
        let mut order: Vec<(String, String, String)> = Vec::new();
        let mut merged: HashMap<(String, String, String), VolumeBinding> = HashMap::new();

        for vbs in std::iter::once(primary).chain(overlays.iter().copied()) {
            for vb in vbs.iter() {
                let key = vb.map_key();
                match merged.get_mut(&key) {
                    Some(existing) => {
                        existing.size_in_bytes += vb.size_in_bytes;
                        existing.read_iops += vb.read_iops;
                        existing.write_iops += vb.write_iops;
                        existing.read_bps += vb.read_bps;
                        existing.write_bps += vb.write_bps;
                    }
                    None => {
                        order.push(key.clone());
                        merged.insert(key, vb.clone());
                    }
                }
            }
        }

        let mut ans = Vec::new();
        for key in order {
            if let Some(vb) = merged.remove(&key) {
                if vb.size_in_bytes > 0 {
                    ans.push(vb);
                }
            }
        }
        VolumeBindings(ans)
    }

    /// 过滤掉大小不为正的绑定
    pub fn remove_non_positive(&self) -> VolumeBindings {
        VolumeBindings(
            self.iter()
                .filter(|vb| vb.size_in_bytes > 0)
                .cloned()
                .collect(),
        )
    }
}

impl Deref for VolumeBindings {
    type Target = Vec<VolumeBinding>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for VolumeBindings {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl IntoIterator for VolumeBindings {
    type Item = VolumeBinding;
    type IntoIter = std::vec::IntoIter<VolumeBinding>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

// 与外界交换时集合表现为卷描述字符串的数组
impl Serialize for VolumeBindings {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.0.len()))?;
        for vb in &self.0 {
            seq.serialize_element(&vb.to_volume_string(false))?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for VolumeBindings {
    fn deserialize<D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        let volumes = Vec::<String>::deserialize(deserializer)?;
        VolumeBindings::parse(&volumes).map_err(de::Error::custom)
    }
}
