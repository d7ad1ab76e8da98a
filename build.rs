// 构建脚本: 仅在启用 ffmpeg 特性时链接FFmpeg依赖库
fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    if std::env::var_os("CARGO_FEATURE_FFMPEG").is_none() {
        return;
    }

    let target_os = std::env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    let target_env = std::env::var("CARGO_CFG_TARGET_ENV").unwrap_or_default();

    // vcpkg 静态FFmpeg在 Windows MSVC 下需要额外的系统库
    if target_os == "windows" && target_env == "msvc" {
        for lib in ["libmfx", "libx264", "oleaut32", "vfw32", "secur32"] {
            println!("cargo:rustc-link-lib=dylib={}", lib);
        }
    }
}
