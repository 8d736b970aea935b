/// 节点容量/用量指标
///
/// 以数据形式输出指标描述和取值，由上层调度器统一收集上报

use serde::Serialize;

use common::Result;

use crate::Plugin;

#[derive(Debug, Clone, Serialize)]
pub struct MetricsDescription {
    pub name: String,
    pub help: String,
    #[serde(rename = "type")]
    pub metrics_type: String,
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Metric {
    pub name: String,
    pub labels: Vec<String>,
    pub value: String,
    pub key: String,
}

/// 本插件可上报的指标集合
pub fn metrics_description() -> Vec<MetricsDescription> {
    vec![
        MetricsDescription {
            name: "rbd_capacity".to_string(),
            help: "node rbd capacity".to_string(),
            metrics_type: "gauge".to_string(),
            labels: vec!["podname".to_string(), "nodename".to_string()],
        },
        MetricsDescription {
            name: "rbd_used".to_string(),
            help: "node rbd used".to_string(),
            metrics_type: "gauge".to_string(),
            labels: vec!["podname".to_string(), "nodename".to_string()],
        },
    ]
}

impl Plugin {
    /// 读取节点账本并生成指标取值
    pub async fn get_metrics(&self, podname: &str, nodename: &str) -> Result<Vec<Metric>> {
        let (info, _) = self.node().get(nodename).await?;
        let labels = vec![podname.to_string(), nodename.to_string()];
        // 指标存储键里节点名的点号换成下划线
        let safe_nodename = nodename.replace('.', "_");
        Ok(vec![
            Metric {
                name: "rbd_capacity".to_string(),
                labels: labels.clone(),
                value: info.cap_size().to_string(),
                key: format!("core.node.{safe_nodename}.rbd.capacity"),
            },
            Metric {
                name: "rbd_used".to_string(),
                labels,
                value: info.usage_size().to_string(),
                key: format!("core.node.{safe_nodename}.rbd.used"),
            },
        ])
    }
}
