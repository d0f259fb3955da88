// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// ONNX Runtime 推理后端
// 负责: 会话创建、执行设备选择、模型元数据读取

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use log::{info, warn};
use ort::execution_providers::{
    CPUExecutionProvider, CUDAExecutionProvider, ExecutionProviderDispatch,
    TensorRTExecutionProvider,
};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::DynValue;
use regex::Regex;

/// 执行设备
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrtEP {
    CPU,
    CUDA(i32),
    Trt(i32),
}

impl OrtEP {
    pub fn from_name(name: &str, device_id: i32) -> Result<Self> {
        match name.to_lowercase().as_str() {
            "cpu" => Ok(OrtEP::CPU),
            "cuda" => Ok(OrtEP::CUDA(device_id)),
            "trt" | "tensorrt" => Ok(OrtEP::Trt(device_id)),
            other => Err(anyhow!("未知的执行设备: {} (可选: cpu, cuda, trt)", other)),
        }
    }

    fn providers(&self) -> Vec<ExecutionProviderDispatch> {
        // CPU 总是放在最后作为回退
        match *self {
            OrtEP::CPU => vec![CPUExecutionProvider::default().build()],
            OrtEP::CUDA(id) => vec![
                CUDAExecutionProvider::default().with_device_id(id).build(),
                CPUExecutionProvider::default().build(),
            ],
            OrtEP::Trt(id) => vec![
                TensorRTExecutionProvider::default()
                    .with_device_id(id)
                    .build(),
                CUDAExecutionProvider::default().with_device_id(id).build(),
                CPUExecutionProvider::default().build(),
            ],
        }
    }
}

/// ONNX Runtime 会话封装
pub struct OrtBackend {
    session: Session,
    input_name: String,
    output_name: String,
    names: Option<Vec<String>>,
}

impl OrtBackend {
    pub fn build(model: &Path, ep: OrtEP) -> Result<Self> {
        let session = Session::builder()
            .context("创建ORT会话构建器失败")?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .context("设置图优化级别失败")?
            .with_execution_providers(ep.providers())
            .context("注册执行设备失败")?
            .commit_from_file(model)
            .with_context(|| format!("加载ONNX模型失败: {}", model.display()))?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .ok_or_else(|| anyhow!("模型没有输入"))?;
        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .ok_or_else(|| anyhow!("模型没有输出"))?;

        // Ultralytics 导出的模型在元数据里带有类别名
        let names = match session.metadata() {
            Ok(meta) => match meta.custom("names") {
                Ok(Some(raw)) => Some(parse_names(&raw)),
                _ => None,
            },
            Err(e) => {
                warn!("⚠️ 读取模型元数据失败: {}", e);
                None
            }
        };

        info!(
            "✅ 模型加载成功: {} | EP: {:?} | 输入: {} | 输出: {} | 类别: {}",
            model.display(),
            ep,
            input_name,
            output_name,
            names
                .as_ref()
                .map_or_else(|| "未知".to_string(), |n| n.len().to_string())
        );

        Ok(Self {
            session,
            input_name,
            output_name,
            names,
        })
    }

    pub fn names(&self) -> Option<&[String]> {
        self.names.as_deref()
    }

    /// 单输入单输出推理, 返回第一个输出的形状和数据
    pub fn run(&mut self, input: DynValue) -> Result<(Vec<usize>, Vec<f32>)> {
        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => input])
            .context("ONNX推理失败")?;
        let (shape, data) = outputs[self.output_name.as_str()]
            .try_extract_tensor::<f32>()
            .context("提取输出张量失败")?;
        let dims = shape.iter().map(|&d| d.max(0) as usize).collect();
        Ok((dims, data.to_vec()))
    }
}

/// 解析 "{0: 'person', 1: 'bicycle', ...}" 形式的类别表
pub fn parse_names(raw: &str) -> Vec<String> {
    let re = match Regex::new(r#"(['"])([-()\w '"]+?)(['"])"#) {
        Ok(re) => re,
        Err(_) => return Vec::new(),
    };
    re.captures_iter(raw)
        .filter_map(|c| c.get(2).map(|m| m.as_str().to_string()))
        .collect()
}
