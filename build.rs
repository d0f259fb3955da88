// 构建脚本: 静态链接FFmpeg时补齐Windows系统库
fn main() {
    #[cfg(all(target_os = "windows", target_env = "msvc"))]
    {
        // libmfx: Intel QSV, libx264: 编码器, oleaut32/vfw32: 采集设备, secur32: RTSP over TLS
        for lib in ["libmfx", "libx264", "oleaut32", "vfw32", "secur32"] {
            println!("cargo:rustc-link-lib=dylib={}", lib);
        }
    }
}
