/// 从磁盘读取的图片
#[derive(Debug)]
pub struct ImageData {
    /// 图片路径
    pub path: String,
    /// 图片原始字节
    pub data: Vec<u8>,
}
